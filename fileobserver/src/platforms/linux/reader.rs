use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

use log::{debug, error, trace, warn};
use nix::errno::Errno;

use crate::{EventSink, FileObserverError};

use super::records::{RawEvent, Records, HEADER_SIZE};

/// Drives the read loop over an arbitrary byte source.
///
/// `fill` performs one read into the buffer and returns the number of bytes
/// written. `Os(EINTR)` and `Os(EAGAIN)` are retried without the sink seeing
/// anything. Every other error, a read shorter than one record header, or a
/// record running past the bytes read ends the loop, and the error is
/// returned. The loop has no other exit.
///
/// Each record is handed to `sink` before the next one is decoded.
pub fn run_read_loop<F, S>(buffer: &mut [u8], mut fill: F, sink: &mut S) -> FileObserverError
where
    F: FnMut(&mut [u8]) -> Result<usize, FileObserverError>,
    S: EventSink + ?Sized,
{
    loop {
        let len = match fill(buffer) {
            Ok(len) => len,
            Err(FileObserverError::Os(Errno::EINTR | Errno::EAGAIN)) => continue,
            Err(e) => return e,
        };

        if len < HEADER_SIZE {
            error!("inotify read returned a short event ({len} bytes)");
            return FileObserverError::ShortRead {
                len,
                header: HEADER_SIZE,
            };
        }

        debug!("read {len} bytes of inotify records");

        let mut records = Records::new(&buffer[..len]);
        for record in records.by_ref() {
            match record {
                Ok(event) => deliver(sink, &event),
                Err(e) => {
                    error!("{e}");
                    return e;
                }
            }
        }

        if records.leftover() > 0 {
            warn!(
                "dropping {} trailing bytes after the last inotify record",
                records.leftover()
            );
        }
    }
}

/// Invokes the sink once. Errors and panics raised by the sink are logged and
/// swallowed so later records are still delivered.
fn deliver<S: EventSink + ?Sized>(sink: &mut S, event: &RawEvent<'_>) {
    trace!(
        "wd {} {:?} cookie {} name {:?}",
        event.wd.as_raw(),
        event.mask,
        event.cookie,
        event.name
    );

    match panic::catch_unwind(AssertUnwindSafe(|| sink.on_event(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            "event sink failed on wd {} ({}): {e}",
            event.wd.as_raw(),
            event.mask.kind_name()
        ),
        Err(payload) => error!(
            "event sink panicked on wd {} ({}): {}",
            event.wd.as_raw(),
            event.mask.kind_name(),
            panic_message(payload.as_ref())
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
