use bitflags::bitflags;

bitflags! {
    /// Inotify event bits, identical to the kernel ABI.
    ///
    /// The same type is used for the interest mask passed to
    /// [`WatchSession::add_watch`](super::WatchSession::add_watch) and for the
    /// mask reported on each record. Bits the kernel sets that have no name
    /// here are kept as they are.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// Data was read from a file.
        const ACCESS = libc::IN_ACCESS;
        /// Data was written to a file.
        const MODIFY = libc::IN_MODIFY;
        /// Metadata (permissions, owner, timestamps) changed.
        const ATTRIB = libc::IN_ATTRIB;
        /// A file opened for writing was closed.
        const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
        /// A file opened read-only was closed.
        const CLOSE_NOWRITE = libc::IN_CLOSE_NOWRITE;
        /// A file or directory was opened.
        const OPEN = libc::IN_OPEN;
        /// An entry was moved out of the watched directory.
        const MOVED_FROM = libc::IN_MOVED_FROM;
        /// An entry was moved into the watched directory.
        const MOVED_TO = libc::IN_MOVED_TO;
        /// An entry was created in the watched directory.
        const CREATE = libc::IN_CREATE;
        /// An entry was deleted from the watched directory.
        const DELETE = libc::IN_DELETE;
        /// The watched path itself was deleted.
        const DELETE_SELF = libc::IN_DELETE_SELF;
        /// The watched path itself was moved.
        const MOVE_SELF = libc::IN_MOVE_SELF;

        /// The filesystem backing the watch was unmounted.
        const UNMOUNT = libc::IN_UNMOUNT;
        /// The kernel event queue overflowed; the record carries wd -1.
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
        /// The watch was removed, explicitly or by the kernel.
        const IGNORED = libc::IN_IGNORED;

        const ONLYDIR = libc::IN_ONLYDIR;
        const DONT_FOLLOW = libc::IN_DONT_FOLLOW;
        const MASK_ADD = libc::IN_MASK_ADD;
        /// The subject of the event is a directory.
        const ISDIR = libc::IN_ISDIR;
        const ONESHOT = libc::IN_ONESHOT;

        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        const MOVE = Self::MOVED_FROM.bits() | Self::MOVED_TO.bits();

        /// Every event kind a watch can subscribe to.
        const ALL_EVENTS = Self::ACCESS.bits()
            | Self::MODIFY.bits()
            | Self::ATTRIB.bits()
            | Self::CLOSE_WRITE.bits()
            | Self::CLOSE_NOWRITE.bits()
            | Self::OPEN.bits()
            | Self::MOVED_FROM.bits()
            | Self::MOVED_TO.bits()
            | Self::CREATE.bits()
            | Self::DELETE.bits()
            | Self::DELETE_SELF.bits()
            | Self::MOVE_SELF.bits();

        /// Only events that change directory contents or file data.
        const CHANGES_ONLY = Self::CREATE.bits()
            | Self::DELETE.bits()
            | Self::CLOSE_WRITE.bits()
            | Self::MOVED_FROM.bits()
            | Self::MOVED_TO.bits();

        const _ = !0;
    }
}

const KIND_NAMES: [(EventMask, &str); 15] = [
    (EventMask::ACCESS, "ACCESS"),
    (EventMask::MODIFY, "MODIFY"),
    (EventMask::ATTRIB, "ATTRIB"),
    (EventMask::CLOSE_WRITE, "CLOSE_WRITE"),
    (EventMask::CLOSE_NOWRITE, "CLOSE_NOWRITE"),
    (EventMask::OPEN, "OPEN"),
    (EventMask::MOVED_FROM, "MOVED_FROM"),
    (EventMask::MOVED_TO, "MOVED_TO"),
    (EventMask::CREATE, "CREATE"),
    (EventMask::DELETE, "DELETE"),
    (EventMask::DELETE_SELF, "DELETE_SELF"),
    (EventMask::MOVE_SELF, "MOVE_SELF"),
    (EventMask::UNMOUNT, "UNMOUNT"),
    (EventMask::Q_OVERFLOW, "Q_OVERFLOW"),
    (EventMask::IGNORED, "IGNORED"),
];

impl EventMask {
    /// Name of the lowest event-kind bit set in this mask, ignoring
    /// modifier bits such as `ISDIR`. Returns `"UNKNOWN"` when none is set.
    pub fn kind_name(&self) -> &'static str {
        KIND_NAMES
            .iter()
            .find(|(kind, _)| self.contains(*kind))
            .map(|(_, name)| *name)
            .unwrap_or("UNKNOWN")
    }
}
