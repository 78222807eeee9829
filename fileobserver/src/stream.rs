use std::{sync::Arc, thread};

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc;

use crate::{FileObserverError, FileSystemEvent, RawEvent, SinkError, WatchSession};

/// Runs the session's read loop on a "FileObserver" thread and yields its
/// events as a stream.
///
/// Events arrive in kernel order and none are dropped. When the loop ends
/// the error that ended it is yielded as the final item; after a
/// [`WatchSession::close`] that is [`FileObserverError::Closed`]. Dropping the
/// stream does not stop the loop, close the session for that.
pub fn event_stream(
    session: Arc<WatchSession>,
) -> Result<impl Stream<Item = Result<FileSystemEvent, FileObserverError>> + Send, FileObserverError>
{
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let events = sender.clone();
    let mut sink = move |event: &RawEvent<'_>| -> Result<(), SinkError> {
        events
            .send(Ok(event.to_owned_event()))
            .map_err(|_| "event stream was dropped")?;
        Ok(())
    };

    thread::Builder::new()
        .name("FileObserver".to_string())
        .spawn(move || {
            let end = session.observe(&mut sink);
            let _ = sender.send(Err(end));
        })?;

    Ok(stream! {
        while let Some(item) = receiver.recv().await {
            let done = item.is_err();
            yield item;
            if done {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::{
        ffi::OsStr,
        fs,
        sync::Arc,
        time::Duration,
    };

    use futures::{pin_mut, StreamExt};
    use tempfile::tempdir;
    use tokio::time::timeout;

    use super::event_stream;
    use crate::{EventMask, FileObserverError, WatchSession};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn streams_events_then_terminal_error() {
        let dir = tempdir().expect("to be created");
        let session = Arc::new(WatchSession::open().expect("to be opened"));
        let wd = session
            .add_watch(dir.path(), EventMask::CREATE | EventMask::MOVE)
            .expect("to be watched");

        let stream = event_stream(session.clone()).expect("to start");
        pin_mut!(stream);

        fs::write(dir.path().join("a"), b"").expect("to be created");
        fs::rename(dir.path().join("a"), dir.path().join("b")).expect("to be renamed");

        let mut events = Vec::new();
        while events.len() < 3 {
            let item = timeout(Duration::from_secs(3), stream.next())
                .await
                .expect("to receive in time")
                .expect("stream to be open")
                .expect("to be an event");
            events.push(item);
        }

        assert!(events.iter().all(|e| e.wd == wd));
        assert!(events[0].mask.contains(EventMask::CREATE));
        assert_eq!(events[0].name.as_deref(), Some(OsStr::new("a")));
        assert!(events[1].mask.contains(EventMask::MOVED_FROM));
        assert!(events[2].mask.contains(EventMask::MOVED_TO));
        assert_ne!(events[1].cookie, 0);
        assert_eq!(events[1].cookie, events[2].cookie);
        assert_eq!(events[2].name.as_deref(), Some(OsStr::new("b")));

        assert!(session.close());

        let last = timeout(Duration::from_secs(3), stream.next())
            .await
            .expect("to end in time")
            .expect("terminal item");
        assert!(matches!(last, Err(FileObserverError::Closed)));

        let after = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("to end in time");
        assert!(after.is_none());
    }
}
