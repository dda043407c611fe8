//! Core node types: identifiers and the inode record.

use serde::{Deserialize, Serialize};

use crate::perm::{can_user_perform_action, FileMode, FilePermissions, Permissions, User};

/// Identifier of a registered driver.
///
/// Assigned at registration time and never reused within a VFS lifetime.
pub type DriverId = u32;

/// The built-in directory driver's id.
pub const DIRECTORY_DRIVER: DriverId = 0;

/// Driver-private tag distinguishing the node sub-types a single driver can
/// produce. Opaque to the VFS core.
pub type NodeKind = u32;

/// Node kind of directories within the directory driver.
pub const DIRECTORY_KIND: NodeKind = 0;

/// External node handle: a slot index paired with the slot's lifetime
/// generation.
///
/// The generation makes use-after-free observable: once a slot is reclaimed
/// every previously handed-out `NodeId` for it stops resolving, instead of
/// silently aliasing the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

impl NodeId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// The root directory's handle: slot 0, generation 0, for the whole VFS
/// lifetime.
pub const ROOT_ID: NodeId = NodeId::new(0, 0);

/// Metadata record of one node.
///
/// A plain value type: the facade hands out snapshots by value and callers
/// persist changes through `Vfs::update_node`. The driver owns whatever
/// `driver_data` points at; the core never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct INode {
    /// Driver serving this node's bytes and metadata.
    pub driver_id: DriverId,
    /// Driver-private node sub-type.
    pub kind: NodeKind,
    /// Owning user and group.
    pub owner: User,
    /// Access control bits.
    pub perms: FilePermissions,
    /// Last read time, epoch seconds.
    pub atime: u32,
    /// Last write time, epoch seconds.
    pub mtime: u32,
    /// Directory edges pointing at this node, plus live enumerator pins.
    pub n_links: u32,
    /// Bumped on metadata change.
    pub version: u32,
    /// Driver-private payload handle, typically an index into the driver's
    /// own storage.
    pub driver_data: u64,
    /// Cached data length, maintained by the driver.
    pub size: u64,
}

impl INode {
    /// Create a bare record with zeroed timestamps, links and payload.
    ///
    /// Drivers call this from `create_node` and fill in their own fields;
    /// the facade assigns `driver_id` afterwards.
    pub const fn new(kind: NodeKind, owner: User, perms: FilePermissions) -> Self {
        Self {
            driver_id: 0,
            kind,
            owner,
            perms,
            atime: 0,
            mtime: 0,
            n_links: 0,
            version: 0,
            driver_data: 0,
            size: 0,
        }
    }

    /// Test whether `actor` may perform `requested` on this node.
    pub const fn user_can(&self, actor: User, requested: Permissions) -> bool {
        can_user_perform_action(self.owner, self.perms, actor, requested)
    }

    /// Replace the permission bits, keeping everything else.
    pub fn set_permissions(&mut self, perms: FilePermissions) {
        self.perms = perms;
        self.version += 1;
    }

    /// Whether the node is served by the built-in directory driver.
    pub const fn is_directory(&self) -> bool {
        self.driver_id == DIRECTORY_DRIVER && self.kind == DIRECTORY_KIND
    }

    /// Render the external mode word: `S_IFDIR` for directory-driver nodes,
    /// low bits from the permissions.
    pub const fn mode(&self) -> FileMode {
        FileMode::new(self.is_directory(), self.perms)
    }
}
