//! Storage driver contract.
//!
//! Every back-end that serves node bytes and metadata implements [`Driver`].
//! The facade owns the node index and hands inodes to the driver by
//! `&mut` per call; the driver owns whatever storage `driver_data` names.

use crate::error::Result;
use crate::inode::{INode, NodeKind};
use crate::perm::{FilePermissions, Permissions, User};

/// Driver-local identifier for an in-progress open session.
pub type OpenToken = u64;

/// Origin of a seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset counted from the start of the data.
    FromStart,
    /// Offset counted from the current position.
    Relative,
}

/// A pluggable storage back-end.
///
/// Contract summary:
/// - `create_node` allocates driver storage and returns a partially filled
///   inode (`driver_data`, `size`, timestamps); the facade fills
///   `driver_id`. Unsupported kinds fail with `WrongKind`.
/// - `destroy_node` releases driver storage and must tolerate being called
///   on any node this driver produced.
/// - `open` returns a token for subsequent I/O and may touch the node
///   (e.g. `atime`); it must reject kinds it does not own.
/// - `read`/`write` transfer bytes at an absolute offset; an offset past
///   the data's end yields `Overflow`; `write` extends the data and
///   maintains `size` and `mtime`.
/// - `seek` resolves a requested offset to an absolute one.
/// - `close` releases the token and is called at most once per open.
pub trait Driver {
    /// The driver's permission-base mask used for permission inheritance
    /// at node creation. Pure.
    fn default_permissions(&self, kind: NodeKind) -> FilePermissions;

    fn create_node(&mut self, kind: NodeKind, owner: User, perms: FilePermissions)
        -> Result<INode>;

    fn destroy_node(&mut self, node: &mut INode) -> Result<()>;

    fn open(&mut self, node: &mut INode, perms: Permissions) -> Result<OpenToken>;

    fn read(&mut self, token: OpenToken, node: &mut INode, offset: u64, dst: &mut [u8])
        -> Result<usize>;

    fn write(&mut self, token: OpenToken, node: &mut INode, offset: u64, src: &[u8])
        -> Result<usize>;

    fn seek(&mut self, token: OpenToken, node: &mut INode, offset: u64, whence: Whence)
        -> Result<u64>;

    fn close(&mut self, token: OpenToken, node: &mut INode) -> Result<()>;
}
