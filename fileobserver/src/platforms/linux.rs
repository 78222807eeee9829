use std::time::Duration;

use crate::FileObserverError;

mod inotify;
mod mask;
pub mod reader;
pub mod records;

pub use inotify::WatchSession;
pub use mask::EventMask;

use records::HEADER_SIZE;

/// Kernel-assigned identifier of one (session, path) watch.
///
/// Only meaningful for the session that returned it, and only until the
/// watch is removed or the session is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchDescriptor(i32);

impl WatchDescriptor {
    pub fn from_raw(wd: i32) -> Self {
        WatchDescriptor(wd)
    }

    pub fn as_raw(&self) -> i32 {
        self.0
    }
}

pub struct SessionOptions {
    /// Size of the buffer each read fills. A record that does not fit makes
    /// the kernel fail the read with `EINVAL`.
    pub buffer_size: usize,
    /// How long a blocked `observe` can take to notice `close`. Values above
    /// 255ms are clamped.
    pub poll_interval: Duration,
    pub close_on_exec: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            buffer_size: 512,
            poll_interval: Duration::from_millis(100),
            close_on_exec: true,
        }
    }
}

impl SessionOptions {
    pub(crate) fn validate(&self) -> Result<(), FileObserverError> {
        if self.buffer_size < HEADER_SIZE {
            return Err(FileObserverError::InvalidOptions(format!(
                "buffer_size {} is smaller than one record header ({HEADER_SIZE} bytes)",
                self.buffer_size
            )));
        }

        if self.poll_interval.is_zero() {
            return Err(FileObserverError::InvalidOptions(
                "poll_interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Epoll timeout in milliseconds, clamped to `1..=255`.
    pub(crate) fn poll_timeout_ms(&self) -> u8 {
        u8::try_from(self.poll_interval.as_millis())
            .unwrap_or(u8::MAX)
            .max(1)
    }
}
