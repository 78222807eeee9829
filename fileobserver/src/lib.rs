//! Linux inotify reader.
//!
//! A [`WatchSession`] owns one inotify descriptor. Paths are registered with
//! [`WatchSession::add_watch`], and [`WatchSession::observe`] blocks, turning
//! the kernel's packed record stream into [`RawEvent`]s handed to an
//! [`EventSink`] one at a time. [`host::FileObserver`] exposes the same
//! operations with integer sentinels for callers bound through a foreign
//! runtime, and [`stream::event_stream`] adapts the loop to a `Stream`.
#![cfg(target_os = "linux")]

mod platforms;

pub mod host;
pub mod stream;

use std::{error::Error as StdError, ffi::OsString, io, path::PathBuf};

use nix::errno::Errno;
use thiserror::Error;

pub use platforms::{
    records::{RawEvent, Records, HEADER_SIZE},
    reader::run_read_loop,
    EventMask, SessionOptions, WatchDescriptor, WatchSession,
};

#[derive(Error, Debug, Clone)]
pub enum FileObserverError {
    #[error("unable to create an inotify instance: {0}")]
    ChannelUnavailable(Errno),

    #[error("unable to watch {}: {errno}", path.display())]
    WatchFailed { path: PathBuf, errno: Errno },

    #[error("short inotify read: got {len} bytes, a record header needs {header}")]
    ShortRead { len: usize, header: usize },

    #[error("inotify record declares a {declared} byte name but only {available} bytes were read")]
    TruncatedRecord { declared: usize, available: usize },

    #[error("inotify read failed: {0}")]
    Os(Errno),

    #[error("the watch session was closed")]
    Closed,

    #[error("the session is already being observed")]
    ObserverStartedError,

    #[error("invalid session options: {0}")]
    InvalidOptions(String),

    #[error("file system error {0}")]
    FileSystemError(String),
}

impl FileObserverError {
    /// Whether the byte stream could not be split into records.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FileObserverError::ShortRead { .. } | FileObserverError::TruncatedRecord { .. }
        )
    }
}

impl From<io::Error> for FileObserverError {
    fn from(value: io::Error) -> Self {
        FileObserverError::FileSystemError(value.to_string())
    }
}

impl From<Errno> for FileObserverError {
    fn from(value: Errno) -> Self {
        FileObserverError::Os(value)
    }
}

/// An owned copy of a [`RawEvent`], for handing events across threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSystemEvent {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    pub cookie: u32,
    pub name: Option<OsString>,
}

pub type SinkError = Box<dyn StdError + Send + Sync>;

/// Receives decoded events from the read loop.
///
/// Called synchronously on whichever thread runs the loop, once per record
/// and in kernel order. The next record is not decoded until `on_event`
/// returns, so the sink may call back into the session (for example to
/// remove a watch). An `Err` or a panic is logged by the loop and does not
/// stop delivery.
pub trait EventSink {
    fn on_event(&mut self, event: &RawEvent<'_>) -> Result<(), SinkError>;
}

impl<F> EventSink for F
where
    F: FnMut(&RawEvent<'_>) -> Result<(), SinkError>,
{
    fn on_event(&mut self, event: &RawEvent<'_>) -> Result<(), SinkError> {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ffi::OsStr,
        fs::{self, OpenOptions},
        io::Write,
        sync::{mpsc, Arc},
        thread,
        time::{Duration, Instant},
    };

    use tempfile::tempdir;

    use crate::{
        EventMask, FileObserverError, FileSystemEvent, RawEvent, SinkError, WatchSession,
    };

    fn append(path: &std::path::Path, bytes: &[u8]) {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .expect("to be opened");
        file.write_all(bytes).expect("to be written");
    }

    #[test]
    fn delivers_modify_for_watched_file() {
        let _ = pretty_env_logger::try_init();

        let dir = tempdir().expect("to be created");
        let file = dir.path().join("watched");
        fs::write(&file, b"").expect("to be created");

        let session = Arc::new(WatchSession::open().expect("to be opened"));
        let wd = session
            .add_watch(&file, EventMask::MODIFY)
            .expect("to be watched");

        let (tx, rx) = mpsc::channel();
        let sink = move |event: &RawEvent<'_>| -> Result<(), SinkError> {
            tx.send(event.to_owned_event())?;
            Ok(())
        };
        let observer = session.clone().spawn_observer(sink).expect("to spawn");

        append(&file, b"hello");

        let event: FileSystemEvent = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("to receive an event");
        assert_eq!(event.wd, wd);
        assert!(event.mask.contains(EventMask::MODIFY));
        assert_eq!(event.name, None);

        assert!(session.close());
        let end = observer.join().expect("to join");
        assert!(matches!(end, FileObserverError::Closed));
    }

    #[test]
    fn reports_directory_entry_names() {
        let dir = tempdir().expect("to be created");

        let session = Arc::new(WatchSession::open().expect("to be opened"));
        let wd = session
            .add_watch(dir.path(), EventMask::CREATE | EventMask::DELETE)
            .expect("to be watched");

        let (tx, rx) = mpsc::channel();
        let sink = move |event: &RawEvent<'_>| -> Result<(), SinkError> {
            tx.send(event.to_owned_event())?;
            Ok(())
        };
        let observer = session.clone().spawn_observer(sink).expect("to spawn");

        let entry = dir.path().join("entry.txt");
        fs::write(&entry, b"x").expect("to be created");
        fs::remove_file(&entry).expect("to be removed");

        let created = rx.recv_timeout(Duration::from_secs(3)).expect("create");
        let deleted = rx.recv_timeout(Duration::from_secs(3)).expect("delete");
        assert_eq!(created.wd, wd);
        assert!(created.mask.contains(EventMask::CREATE));
        assert_eq!(created.name.as_deref(), Some(OsStr::new("entry.txt")));
        assert!(deleted.mask.contains(EventMask::DELETE));
        assert_eq!(deleted.name.as_deref(), Some(OsStr::new("entry.txt")));

        session.close();
        observer.join().expect("to join");
    }

    #[test]
    fn sink_can_remove_watch_while_observing() {
        let dir = tempdir().expect("to be created");
        let file = dir.path().join("once");
        fs::write(&file, b"").expect("to be created");

        let session = Arc::new(WatchSession::open().expect("to be opened"));
        let wd = session
            .add_watch(&file, EventMask::MODIFY)
            .expect("to be watched");

        let (tx, rx) = mpsc::channel();
        let inner = session.clone();
        let sink = move |event: &RawEvent<'_>| -> Result<(), SinkError> {
            if event.mask.contains(EventMask::MODIFY) {
                inner.remove_watch(event.wd);
                inner.remove_watch(event.wd);
            }
            tx.send(event.to_owned_event())?;
            Ok(())
        };
        let observer = session.clone().spawn_observer(sink).expect("to spawn");

        append(&file, b"1");

        let first = rx.recv_timeout(Duration::from_secs(3)).expect("modify");
        assert!(first.mask.contains(EventMask::MODIFY));
        let second = rx.recv_timeout(Duration::from_secs(3)).expect("ignored");
        assert_eq!(second.wd, wd);
        assert!(second.mask.contains(EventMask::IGNORED));

        session.close();
        observer.join().expect("to join");
    }

    #[test]
    fn close_unblocks_observe() {
        let session = Arc::new(WatchSession::open().expect("to be opened"));
        let sink = |_: &RawEvent<'_>| -> Result<(), SinkError> { Ok(()) };
        let observer = session.clone().spawn_observer(sink).expect("to spawn");

        thread::sleep(Duration::from_millis(50));
        assert!(!observer.is_finished());

        let closed_at = Instant::now();
        assert!(session.close());
        while !observer.is_finished() {
            assert!(
                closed_at.elapsed() < Duration::from_secs(2),
                "observe did not return after close"
            );
            thread::sleep(Duration::from_millis(10));
        }

        let end = observer.join().expect("to join");
        assert!(matches!(end, FileObserverError::Closed));
        assert!(!end.is_framing());
    }
}
