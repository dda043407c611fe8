//! Error types for VFS operations.

use thiserror::Error;

/// Classification of a VFS failure.
///
/// Kinds mirror the POSIX-style error domain the engine reports to callers;
/// protocol layers map them onto their own error vocabulary (errno, 9P
/// Rerror, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Handle invalid: stale generation, out-of-range slot or unknown driver.
    #[error("bad handle")]
    BadHandle,

    /// Named entry or target does not exist.
    #[error("no such entry")]
    NotFound,

    /// Operation requires a directory.
    #[error("not a directory")]
    NotDirectory,

    /// Operation requires a non-directory.
    #[error("is a directory")]
    IsDirectory,

    /// Actor lacks the required permission.
    #[error("permission denied")]
    PermissionDenied,

    /// An entry with that name already exists.
    #[error("entry already exists")]
    AlreadyExists,

    /// Directory still has entries.
    #[error("directory not empty")]
    NotEmpty,

    /// Internal consistency violation: an edge points at a dangling node.
    #[error("dangling node reference")]
    Inconsistency,

    /// Offset past the end of the node's data.
    #[error("offset out of range")]
    Overflow,

    /// Requested driver id is not registered.
    #[error("no such driver")]
    UnknownDriver,

    /// Driver still has live nodes.
    #[error("driver is busy")]
    Busy,

    /// Driver does not support the requested node kind.
    #[error("unsupported node kind")]
    WrongKind,
}

/// Error returned by every fallible VFS operation.
///
/// Carries the failing operation's name so a bare `Display` rendering is
/// enough to locate the call site, e.g. `"walk: permission denied"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op}: {kind}")]
pub struct VfsError {
    kind: ErrorKind,
    op: &'static str,
}

impl VfsError {
    /// Create an error for the named operation.
    pub const fn new(kind: ErrorKind, op: &'static str) -> Self {
        Self { kind, op }
    }

    /// The failure classification.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Name of the operation that failed.
    pub const fn op(&self) -> &'static str {
        self.op
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_operation() {
        let err: VfsError = VfsError::new(ErrorKind::PermissionDenied, "walk");
        assert_eq!(err.to_string(), "walk: permission denied");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.op(), "walk");
    }

    #[test]
    fn test_error_equality() {
        let a: VfsError = VfsError::new(ErrorKind::NotFound, "lookup");
        let b: VfsError = VfsError::new(ErrorKind::NotFound, "lookup");
        let c: VfsError = VfsError::new(ErrorKind::NotFound, "link");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
