//! Integer-valued boundary for callers bound through a foreign runtime.
//!
//! Failures surface as negative values instead of errors, so the binding
//! layer can pass them through unchanged.

use std::{os::fd::RawFd, path::Path, sync::Arc};

use log::{error, warn};

use crate::{
    EventMask, EventSink, FileObserverError, SessionOptions, WatchDescriptor, WatchSession,
};

/// Returned in place of a descriptor when an operation fails.
pub const FAILED: i32 = -1;

pub struct FileObserver {
    session: Option<Arc<WatchSession>>,
}

impl FileObserver {
    /// Opens an inotify instance. Never fails; check [`fd`](Self::fd) for a
    /// negative value to detect that notifications are unavailable.
    pub fn init() -> FileObserver {
        FileObserver::init_with(SessionOptions::default())
    }

    pub fn init_with(options: SessionOptions) -> FileObserver {
        match WatchSession::with_options(options) {
            Ok(session) => FileObserver {
                session: Some(Arc::new(session)),
            },
            Err(e) => {
                error!("file observer unavailable: {e}");
                FileObserver { session: None }
            }
        }
    }

    pub fn fd(&self) -> RawFd {
        self.session.as_ref().map_or(FAILED, |session| session.raw_fd())
    }

    pub fn session(&self) -> Option<&Arc<WatchSession>> {
        self.session.as_ref()
    }

    /// Returns the watch descriptor for `path`, or [`FAILED`]. No syscall is
    /// made when the instance itself failed to open.
    pub fn start_watching(&self, path: impl AsRef<Path>, mask: u32) -> i32 {
        if self.fd() < 0 {
            return FAILED;
        }

        let Some(session) = &self.session else {
            return FAILED;
        };

        match session.add_watch(path, EventMask::from_bits_retain(mask)) {
            Ok(wd) => wd.as_raw(),
            Err(e) => {
                warn!("{e}");
                FAILED
            }
        }
    }

    pub fn stop_watching(&self, wd: i32) {
        if let Some(session) = &self.session {
            session.remove_watch(WatchDescriptor::from_raw(wd));
        }
    }

    /// Blocks delivering events to `sink` until the session is closed or the
    /// stream breaks.
    pub fn observe<S: EventSink + ?Sized>(&self, sink: &mut S) -> FileObserverError {
        match &self.session {
            Some(session) => session.observe(sink),
            None => FileObserverError::Closed,
        }
    }

    pub fn close(&self) -> bool {
        self.session.as_ref().map_or(true, |session| session.close())
    }
}
