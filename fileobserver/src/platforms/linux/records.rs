use std::{ffi::OsStr, mem, os::unix::ffi::OsStrExt};

use crate::{FileObserverError, FileSystemEvent};

use super::{EventMask, WatchDescriptor};

/// Size of the fixed `struct inotify_event` header preceding every record.
pub const HEADER_SIZE: usize = mem::size_of::<libc::inotify_event>();

const WD_OFFSET: usize = 0;
const MASK_OFFSET: usize = 4;
const COOKIE_OFFSET: usize = 8;
const LEN_OFFSET: usize = 12;

/// One decoded record, borrowing its name from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent<'a> {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    /// Links the `MOVED_FROM` and `MOVED_TO` halves of a rename, 0 otherwise.
    pub cookie: u32,
    /// Entry name relative to the watched directory. `None` when the event
    /// concerns the watched path itself.
    pub name: Option<&'a OsStr>,
}

impl RawEvent<'_> {
    pub fn to_owned_event(&self) -> FileSystemEvent {
        FileSystemEvent {
            wd: self.wd,
            mask: self.mask,
            cookie: self.cookie,
            name: self.name.map(OsStr::to_os_string),
        }
    }
}

/// Lazily decodes the records packed into the bytes returned by one read.
///
/// Records come out in buffer order. A record whose declared name length runs
/// past the end of the buffer yields a single [`FileObserverError::TruncatedRecord`]
/// and ends the iteration. Fewer than [`HEADER_SIZE`] trailing bytes end the
/// iteration silently; [`Records::leftover`] reports how many were left.
pub struct Records<'a> {
    buffer: &'a [u8],
    offset: usize,
    remaining: usize,
    failed: bool,
}

impl<'a> Records<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Records {
            buffer,
            offset: 0,
            remaining: buffer.len(),
            failed: false,
        }
    }

    /// Bytes not yet consumed by the iterator.
    pub fn leftover(&self) -> usize {
        self.remaining
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<RawEvent<'a>, FileObserverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining < HEADER_SIZE {
            return None;
        }

        let header = &self.buffer[self.offset..self.offset + HEADER_SIZE];
        let name_len = read_u32(header, LEN_OFFSET) as usize;
        let available = self.remaining - HEADER_SIZE;

        if name_len > available {
            self.failed = true;
            return Some(Err(FileObserverError::TruncatedRecord {
                declared: name_len,
                available,
            }));
        }

        let name = if name_len > 0 {
            let start = self.offset + HEADER_SIZE;
            let padded = &self.buffer[start..start + name_len];
            let end = padded.iter().position(|b| *b == 0).unwrap_or(padded.len());
            Some(OsStr::from_bytes(&padded[..end]))
        } else {
            None
        };

        let event = RawEvent {
            wd: WatchDescriptor::from_raw(read_u32(header, WD_OFFSET) as i32),
            mask: EventMask::from_bits_retain(read_u32(header, MASK_OFFSET)),
            cookie: read_u32(header, COOKIE_OFFSET),
            name,
        };

        let record_size = HEADER_SIZE + name_len;
        self.offset += record_size;
        self.remaining -= record_size;

        Some(Ok(event))
    }
}

fn read_u32(header: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&header[at..at + 4]);
    u32::from_ne_bytes(word)
}

/// Test helper encoding records the way the kernel lays them out.
#[cfg(test)]
pub(crate) fn encode_record(
    buffer: &mut Vec<u8>,
    wd: i32,
    mask: u32,
    cookie: u32,
    name: Option<&str>,
    padded_len: usize,
) {
    buffer.extend_from_slice(&wd.to_ne_bytes());
    buffer.extend_from_slice(&mask.to_ne_bytes());
    buffer.extend_from_slice(&cookie.to_ne_bytes());
    buffer.extend_from_slice(&(padded_len as u32).to_ne_bytes());
    if let Some(name) = name {
        assert!(name.len() < padded_len);
        buffer.extend_from_slice(name.as_bytes());
        buffer.resize(buffer.len() + padded_len - name.len(), 0);
    }
}
