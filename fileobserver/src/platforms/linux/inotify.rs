use std::{
    ffi::CString,
    os::{
        fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd},
        unix::ffi::OsStrExt,
    },
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard,
    },
    thread::{self, JoinHandle},
};

use log::{debug, error, info, warn};
use nix::{
    errno::Errno,
    sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags},
    unistd,
};
use tokio_util::sync::CancellationToken;

use crate::{EventSink, FileObserverError};

use super::{reader::run_read_loop, EventMask, SessionOptions, WatchDescriptor};

/// One inotify instance and the watches registered on it.
///
/// `add_watch` and `remove_watch` may be called from any thread, including
/// from inside the sink while `observe` is running. Only one thread may
/// observe at a time.
///
/// `close` is the only way to stop a running `observe`: the loop notices
/// within `SessionOptions::poll_interval` and returns
/// [`FileObserverError::Closed`].
pub struct WatchSession {
    inotify: RwLock<Option<OwnedFd>>,
    epoll: Epoll,
    options: SessionOptions,
    cancellation_token: CancellationToken,
    observing: AtomicBool,
}

impl WatchSession {
    pub fn open() -> Result<WatchSession, FileObserverError> {
        WatchSession::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Result<WatchSession, FileObserverError> {
        options.validate()?;

        // Reads only happen after epoll reports readiness, so the descriptor
        // never has to block on its own.
        let mut flags = libc::IN_NONBLOCK;
        if options.close_on_exec {
            flags |= libc::IN_CLOEXEC;
        }

        let fd = unsafe { libc::inotify_init1(flags) };
        if fd < 0 {
            return Err(FileObserverError::ChannelUnavailable(Errno::last()));
        }
        let inotify = unsafe { OwnedFd::from_raw_fd(fd) };

        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(FileObserverError::ChannelUnavailable)?;
        epoll
            .add(&inotify, EpollEvent::new(EpollFlags::EPOLLIN, fd as u64))
            .map_err(FileObserverError::ChannelUnavailable)?;

        debug!("opened inotify instance {fd}");

        Ok(WatchSession {
            inotify: RwLock::new(Some(inotify)),
            epoll,
            options,
            cancellation_token: CancellationToken::new(),
            observing: AtomicBool::new(false),
        })
    }

    /// The inotify descriptor, or -1 once the session is closed.
    pub fn raw_fd(&self) -> RawFd {
        self.inotify_fd()
            .as_ref()
            .map_or(-1, |fd| fd.as_raw_fd())
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Registers interest in `path` for the kinds in `mask`.
    ///
    /// Watching a path that is already watched by this session returns the
    /// same descriptor and replaces its mask, unless `MASK_ADD` is set.
    pub fn add_watch(
        &self,
        path: impl AsRef<Path>,
        mask: EventMask,
    ) -> Result<WatchDescriptor, FileObserverError> {
        let path = path.as_ref();
        let inotify = self.inotify_fd();
        let fd = inotify.as_ref().ok_or(FileObserverError::Closed)?;

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            FileObserverError::WatchFailed {
                path: path.to_path_buf(),
                errno: Errno::EINVAL,
            }
        })?;

        let wd = unsafe { libc::inotify_add_watch(fd.as_raw_fd(), c_path.as_ptr(), mask.bits()) };
        if wd < 0 {
            return Err(FileObserverError::WatchFailed {
                path: path.to_path_buf(),
                errno: Errno::last(),
            });
        }

        debug!("watching {} as wd {wd} ({mask:?})", path.display());
        Ok(WatchDescriptor::from_raw(wd))
    }

    /// Removes a watch. Stale, foreign or already removed descriptors are
    /// ignored, as is a closed session.
    pub fn remove_watch(&self, wd: WatchDescriptor) {
        let inotify = self.inotify_fd();
        let Some(fd) = inotify.as_ref() else {
            return;
        };

        if unsafe { libc::inotify_rm_watch(fd.as_raw_fd(), wd.as_raw()) } < 0 {
            warn!(
                "inotify_rm_watch on wd {} failed: {}",
                wd.as_raw(),
                Errno::last()
            );
        }
    }

    /// Runs the read loop on the calling thread, handing each record to
    /// `sink`. Only returns once the loop has terminated.
    pub fn observe<S: EventSink + ?Sized>(&self, sink: &mut S) -> FileObserverError {
        if self.observing.swap(true, Ordering::AcqRel) {
            return FileObserverError::ObserverStartedError;
        }

        let mut buffer = vec![0u8; self.options.buffer_size];
        let end = run_read_loop(&mut buffer, |buffer| self.fill(buffer), sink);

        self.observing.store(false, Ordering::Release);

        match &end {
            FileObserverError::Closed => info!("inotify session closed, observer exiting"),
            e => error!("inotify observer stopped: {e}"),
        }
        end
    }

    /// Runs [`observe`](Self::observe) on a dedicated thread. Joining the
    /// handle yields the error that ended the loop.
    pub fn spawn_observer<S>(
        self: Arc<Self>,
        mut sink: S,
    ) -> Result<JoinHandle<FileObserverError>, FileObserverError>
    where
        S: EventSink + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("FileObserver".to_string())
            .spawn(move || self.observe(&mut sink))?;
        Ok(handle)
    }

    /// Closes the inotify descriptor, dropping every watch registered on it.
    /// Returns false if releasing the descriptor reported an error.
    pub fn close(&self) -> bool {
        if self.cancellation_token.is_cancelled() {
            return true;
        }

        self.cancellation_token.cancel();

        let inotify = self
            .inotify
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(inotify) = inotify else {
            return true;
        };

        let mut has_error = false;

        if let Err(e) = self.epoll.delete(&inotify) {
            warn!("epoll delete returned error: {e}");
            has_error = true;
        }

        if let Err(e) = unistd::close(inotify.into_raw_fd()) {
            warn!("closing inotify descriptor failed: {e}");
            has_error = true;
        }

        !has_error
    }

    /// One read for the loop: waits for readiness, then reads whatever the
    /// kernel has queued.
    fn fill(&self, buffer: &mut [u8]) -> Result<usize, FileObserverError> {
        let mut events = [EpollEvent::empty(); 1];

        loop {
            if self.cancellation_token.is_cancelled() {
                return Err(FileObserverError::Closed);
            }

            match self.epoll.wait(&mut events, self.options.poll_timeout_ms()) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => break,
                Err(e) => return Err(FileObserverError::Os(e)),
            }
        }

        let inotify = self.inotify_fd();
        let fd = inotify.as_ref().ok_or(FileObserverError::Closed)?;
        Ok(unistd::read(fd.as_raw_fd(), buffer)?)
    }

    fn inotify_fd(&self) -> RwLockReadGuard<'_, Option<OwnedFd>> {
        self.inotify.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.close();
    }
}
