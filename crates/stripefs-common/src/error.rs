//! Error types for StripeFS
//!
//! Internal failures all map onto a POSIX errno via [`Error::errno`]; the
//! fan-out engine records that value in the per-request error slot and the
//! caller sees plain errno semantics.

use crate::errno::Errno;
use thiserror::Error;

/// Common result type for StripeFS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for StripeFS.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unaligned offset {offset}: expected multiple of {alignment}")]
    Unaligned { offset: u64, alignment: u64 },

    #[error("insufficient fragments for reconstruction: have {available}, need {required}")]
    InsufficientFragments { available: usize, required: usize },

    #[error("fragment size mismatch")]
    FragmentSizeMismatch,

    #[error("singular decode matrix")]
    SingularMatrix,

    #[error("quorum not reached: best group has {best}, required {required}")]
    NoQuorum { best: usize, required: usize },

    #[error("node {node} failed: {errno}")]
    NodeFailed { node: usize, errno: Errno },

    #[error("operation failed: {0}")]
    Os(Errno),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// The errno this error surfaces to the caller.
    #[must_use]
    pub fn errno(&self) -> Errno {
        match self {
            Self::InvalidConfig(_) | Self::InvalidArgument(_) | Self::Unaligned { .. } => {
                Errno::EINVAL
            }
            Self::InsufficientFragments { .. }
            | Self::FragmentSizeMismatch
            | Self::SingularMatrix
            | Self::NoQuorum { .. }
            | Self::Internal(_) => Errno::EIO,
            Self::NodeFailed { errno, .. } | Self::Os(errno) => {
                // A recorded "success" errno paired with a failure is a
                // contract violation upstream; substitute EIO rather than
                // propagating an invalid success.
                if errno.is_err() {
                    *errno
                } else {
                    Errno::EIO
                }
            }
        }
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Self::Os(errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(
            Error::InvalidArgument("x".into()).errno(),
            Errno::EINVAL
        );
        assert_eq!(
            Error::NoQuorum {
                best: 1,
                required: 3
            }
            .errno(),
            Errno::EIO
        );
        assert_eq!(
            Error::NodeFailed {
                node: 0,
                errno: Errno::ENOENT
            }
            .errno(),
            Errno::ENOENT
        );
    }

    #[test]
    fn test_zero_errno_defensively_maps_to_eio() {
        assert_eq!(Error::Os(Errno::OK).errno(), Errno::EIO);
    }
}
