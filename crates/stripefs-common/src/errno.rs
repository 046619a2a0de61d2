//! POSIX errno model
//!
//! Per-node replies and terminal answers carry a plain errno value so the
//! layer above can hand it to the kernel unchanged. Only the handful of
//! values this core actually produces are named here.

use std::fmt;

/// A POSIX errno value. Zero means "no error".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Errno(pub i32);

impl Errno {
    pub const OK: Errno = Errno(0);
    pub const EPERM: Errno = Errno(1);
    pub const ENOENT: Errno = Errno(2);
    pub const EIO: Errno = Errno(5);
    pub const EBADF: Errno = Errno(9);
    pub const ENOMEM: Errno = Errno(12);
    pub const EACCES: Errno = Errno(13);
    pub const EBUSY: Errno = Errno(16);
    pub const EEXIST: Errno = Errno(17);
    pub const ENOTDIR: Errno = Errno(20);
    pub const EISDIR: Errno = Errno(21);
    pub const EINVAL: Errno = Errno(22);
    pub const ENOSPC: Errno = Errno(28);
    pub const ENOTEMPTY: Errno = Errno(39);
    pub const ENODATA: Errno = Errno(61);
    pub const ENOTSUP: Errno = Errno(95);
    pub const ENOTCONN: Errno = Errno(107);

    /// True if this value denotes an actual error.
    #[must_use]
    pub const fn is_err(self) -> bool {
        self.0 != 0
    }

    /// Raw errno value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Symbolic name, for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "OK",
            1 => "EPERM",
            2 => "ENOENT",
            5 => "EIO",
            9 => "EBADF",
            12 => "ENOMEM",
            13 => "EACCES",
            16 => "EBUSY",
            17 => "EEXIST",
            20 => "ENOTDIR",
            21 => "EISDIR",
            22 => "EINVAL",
            28 => "ENOSPC",
            39 => "ENOTEMPTY",
            61 => "ENODATA",
            95 => "ENOTSUP",
            107 => "ENOTCONN",
            _ => "E?",
        }
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::error::Error for Errno {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_basics() {
        assert!(!Errno::OK.is_err());
        assert!(Errno::EIO.is_err());
        assert_eq!(Errno::EIO.raw(), 5);
        assert_eq!(Errno::EIO.name(), "EIO");
        assert_eq!(format!("{}", Errno::ENOENT), "ENOENT");
    }
}
