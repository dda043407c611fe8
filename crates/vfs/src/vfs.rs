//! The VFS facade: driver registry, node graph operations, permission
//! enforcement and path traversal.
//!
//! The facade owns the node index and every registered driver. All methods
//! take `&self` over interior-mutable state so open files and directory
//! enumerators can coexist with facade calls on the same VFS; the engine is
//! single-threaded cooperative, so the interior cell is a `RefCell`, not a
//! lock. Callers sharing a VFS across threads wrap the whole handle in
//! their own mutex.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::dir::{DirEnumerator, DirectoryDriver, Entry};
use crate::driver::{Driver, OpenToken, Whence};
use crate::error::{ErrorKind, Result, VfsError};
use crate::file::File;
use crate::index::{NodeIndex, Release};
use crate::inode::{DriverId, INode, NodeId, NodeKind, DIRECTORY_DRIVER, DIRECTORY_KIND, ROOT_ID};
use crate::perm::{FilePermissions, Permissions, User};

/// The no-op path segment.
pub const THIS_DIR: &str = ".";

/// The parent segment. Directories store no parent pointer; resolving it is
/// the path-parser layer's job and the core treats it as an ordinary name.
pub const PARENT_DIR: &str = "..";

struct VfsState {
    index: NodeIndex,
    dir_driver: DirectoryDriver,
    drivers: HashMap<DriverId, Box<dyn Driver>>,
    next_driver_id: DriverId,
}

impl VfsState {
    fn driver_mut<'a>(&'a mut self, id: DriverId) -> Option<&'a mut (dyn Driver + 'a)> {
        if id == DIRECTORY_DRIVER {
            return Some(&mut self.dir_driver);
        }

        match self.drivers.get_mut(&id) {
            Some(driver) => Some(driver.as_mut()),
            None => None,
        }
    }

    /// Drop one reference to the node, running driver destruction when the
    /// last one goes away.
    fn release_node(&mut self, id: NodeId) {
        let Release::Freed(mut freed) = self.index.release(id) else {
            return;
        };

        tracing::debug!("node destroyed: slot {} driver {}", id.index, freed.driver_id);
        match self.driver_mut(freed.driver_id) {
            Some(driver) => {
                if let Err(err) = driver.destroy_node(&mut freed) {
                    tracing::warn!("driver failed to destroy node storage: {}", err);
                }
            }
            None => {
                tracing::warn!("no driver {} for destroyed node", freed.driver_id);
            }
        }
    }

    /// Find the named entry in a directory node. `None` when the id does
    /// not resolve, the node is not a directory, or the name is absent.
    fn lookup(&self, dir_id: NodeId, name: &str) -> Option<Entry> {
        let dir_node: &INode = self.index.get(dir_id)?;
        if !dir_node.is_directory() {
            return None;
        }

        self.dir_driver.lookup(dir_node, name)
    }
}

/// An in-memory virtual filesystem.
///
/// A graph of typed nodes with named edges. Directories are the vertices;
/// every other node is a leaf served by a registered [`Driver`]. Nodes
/// carry Unix-style ownership and permissions; every operation takes the
/// acting [`User`] and is permission-checked against the relevant
/// directory or node.
pub struct Vfs {
    state: RefCell<VfsState>,
}

impl Vfs {
    /// Create a VFS whose root directory is owned by `root_owner` with
    /// permissions `root_perms`.
    pub fn new(root_owner: User, root_perms: FilePermissions) -> Self {
        let mut state: VfsState = VfsState {
            index: NodeIndex::new(),
            dir_driver: DirectoryDriver::new(),
            drivers: HashMap::new(),
            next_driver_id: DIRECTORY_DRIVER + 1,
        };

        let mut root: INode = state
            .dir_driver
            .create_node(DIRECTORY_KIND, root_owner, root_perms)
            .expect("directory driver accepts the directory kind");
        root.driver_id = DIRECTORY_DRIVER;
        root.n_links = 1;

        let root_id: NodeId = state.index.allocate(root);
        debug_assert_eq!(root_id, ROOT_ID);

        Self {
            state: RefCell::new(state),
        }
    }

    /// The root directory's handle.
    pub const fn root_id(&self) -> NodeId {
        ROOT_ID
    }

    /////////////////////////////////////////////////////////////
    // Driver registry
    /////////////////////////////////////////////////////////////

    /// Register a storage driver and return its id. Ids are never reused.
    pub fn register_driver<D: Driver + 'static>(&self, driver: D) -> DriverId {
        let state: &mut VfsState = &mut *self.state.borrow_mut();
        let id: DriverId = state.next_driver_id;
        state.next_driver_id += 1;
        state.drivers.insert(id, Box::new(driver));

        tracing::debug!("driver registered: {}", id);
        id
    }

    /// Unregister a previously registered driver.
    ///
    /// Refuses with `Busy` while any live node still belongs to the
    /// driver; the directory driver cannot be unregistered.
    pub fn unregister_driver(&self, id: DriverId) -> Result<()> {
        let state: &mut VfsState = &mut *self.state.borrow_mut();
        if id == DIRECTORY_DRIVER || !state.drivers.contains_key(&id) {
            return Err(VfsError::new(ErrorKind::BadHandle, "unregister_driver"));
        }

        let in_use: bool = state.index.live_nodes().any(|(_, node)| node.driver_id == id);
        if in_use {
            return Err(VfsError::new(ErrorKind::Busy, "unregister_driver"));
        }

        state.drivers.remove(&id);
        tracing::debug!("driver unregistered: {}", id);
        Ok(())
    }

    /////////////////////////////////////////////////////////////
    // Node access
    /////////////////////////////////////////////////////////////

    /// Snapshot a node's metadata. Equivalent of a stat call.
    pub fn node_by_id(&self, id: NodeId) -> Option<INode> {
        self.state.borrow().index.get(id).copied()
    }

    /// A node's cached data length.
    pub fn size(&self, id: NodeId) -> Option<u64> {
        self.node_by_id(id).map(|node| node.size)
    }

    /// Persist a modified metadata snapshot.
    ///
    /// The node's driver and kind are immutable post-creation and the link
    /// count is owned by the index; a snapshot disagreeing on driver or
    /// kind is rejected with `BadHandle`.
    pub fn update_node(&self, id: NodeId, node: INode) -> Result<()> {
        self.state.borrow_mut().index.update(id, node, "update_node")
    }

    /////////////////////////////////////////////////////////////
    // Graph linking
    /////////////////////////////////////////////////////////////

    /// Create a node with the given driver and kind and link it under
    /// `parent` as `name`.
    ///
    /// `owner` is both the acting user (WRITE on `parent` required) and
    /// the new node's owner. Effective permissions are the requested ones
    /// restricted by the parent's mode over the driver's default base. If
    /// linking fails the freshly created node is destroyed again.
    pub fn mknode(
        &self,
        parent: NodeId,
        name: &str,
        driver_id: DriverId,
        kind: NodeKind,
        owner: User,
        perms: FilePermissions,
    ) -> Result<NodeId> {
        let state: &mut VfsState = &mut *self.state.borrow_mut();

        let parent_node: INode = *state
            .index
            .get(parent)
            .ok_or(VfsError::new(ErrorKind::NotFound, "mknode"))?;
        if !parent_node.is_directory() {
            return Err(VfsError::new(ErrorKind::NotDirectory, "mknode"));
        }
        if !parent_node.user_can(owner, Permissions::WRITE) {
            return Err(VfsError::new(ErrorKind::PermissionDenied, "mknode"));
        }

        let driver: &mut dyn Driver = state
            .driver_mut(driver_id)
            .ok_or(VfsError::new(ErrorKind::UnknownDriver, "mknode"))?;

        // The parent's mode restricts exactly the bits of the driver's
        // default base.
        let base: u32 = driver.default_permissions(kind).0 & 0o777;
        let effective: FilePermissions =
            FilePermissions(perms.0 & (!base | (parent_node.perms.0 & base)));

        let mut node: INode = driver.create_node(kind, owner, effective)?;
        node.driver_id = driver_id;
        node.n_links = 0;

        let id: NodeId = state.index.allocate(node);
        match state.dir_driver.add_entry(&parent_node, name, id) {
            Ok(()) => {
                state.index.add_link(id);
                tracing::debug!("node created: slot {} driver {}", id.index, driver_id);
                Ok(id)
            }
            Err(err) => {
                // Roll the creation back so driver storage cannot leak.
                state.release_node(id);
                Err(err)
            }
        }
    }

    /// Create a directory under `parent`.
    pub fn create_directory(
        &self,
        parent: NodeId,
        name: &str,
        owner: User,
        perms: FilePermissions,
    ) -> Result<NodeId> {
        self.mknode(parent, name, DIRECTORY_DRIVER, DIRECTORY_KIND, owner, perms)
    }

    /// Create a named link in directory `from` pointing at node `to`.
    ///
    /// The actor needs WRITE on `from`. Multiple links to the same target
    /// under different names are allowed; the link changes neither the
    /// target's ownership nor its permissions.
    pub fn link(&self, actor: User, name: &str, from: NodeId, to: NodeId) -> Result<()> {
        if from == to {
            return Err(VfsError::new(ErrorKind::BadHandle, "link"));
        }

        let state: &mut VfsState = &mut *self.state.borrow_mut();

        let dir_node: INode = *state
            .index
            .get(from)
            .ok_or(VfsError::new(ErrorKind::NotFound, "link"))?;
        if !dir_node.is_directory() {
            return Err(VfsError::new(ErrorKind::NotDirectory, "link"));
        }
        if !dir_node.user_can(actor, Permissions::WRITE) {
            return Err(VfsError::new(ErrorKind::PermissionDenied, "link"));
        }
        if state.index.get(to).is_none() {
            return Err(VfsError::new(ErrorKind::NotFound, "link"));
        }

        state.dir_driver.add_entry(&dir_node, name, to)?;
        state.index.add_link(to);

        tracing::trace!("linked {:?} as {:?} under {:?}", to, name, from);
        Ok(())
    }

    /// Remove the entry `name` from directory `from`.
    ///
    /// An absent name is a successful no-op. A target directory that still
    /// has entries fails with `NotEmpty`. When the removed edge was the
    /// target's last reference the node is destroyed.
    pub fn unlink(&self, actor: User, from: NodeId, name: &str) -> Result<()> {
        let state: &mut VfsState = &mut *self.state.borrow_mut();

        let dir_node: INode = *state
            .index
            .get(from)
            .ok_or(VfsError::new(ErrorKind::BadHandle, "unlink"))?;
        if !dir_node.is_directory() {
            return Err(VfsError::new(ErrorKind::NotDirectory, "unlink"));
        }
        if !dir_node.user_can(actor, Permissions::WRITE) {
            return Err(VfsError::new(ErrorKind::PermissionDenied, "unlink"));
        }

        // A directory may only be unlinked once it has no outgoing edges.
        if let Some(entry) = state.dir_driver.lookup(&dir_node, name) {
            if let Some(target) = state.index.get(entry.node_id) {
                if target.is_directory() && state.dir_driver.count_entries(target) > 0 {
                    return Err(VfsError::new(ErrorKind::NotEmpty, "unlink"));
                }
            }
        }

        let removed: Option<NodeId> = state.dir_driver.remove_entry(&dir_node, name)?;
        if let Some(target) = removed {
            tracing::trace!("unlinked {:?} from {:?}", name, from);
            state.release_node(target);
        }

        Ok(())
    }

    /// Find the named entry in a directory. Non-mutating; no permission
    /// check beyond existence.
    pub fn lookup(&self, dir_id: NodeId, name: &str) -> Option<Entry> {
        self.state.borrow().lookup(dir_id, name)
    }

    /////////////////////////////////////////////////////////////
    // Traversal
    /////////////////////////////////////////////////////////////

    /// Resolve `path` from the root. Convenience for [`Vfs::walk`].
    pub fn walk_from_root(&self, actor: User, path: &str) -> Result<Entry> {
        self.walk(actor, ROOT_ID, path, |_, _| {})
    }

    /// Resolve a `/`-separated path starting at `start`, invoking `visit`
    /// for every entry stepped through.
    ///
    /// Each traversed node needs READ for `actor`. Empty and `.` segments
    /// advance without lookup. The empty path resolves to
    /// `Entry { ".", start }`.
    pub fn walk<F>(&self, actor: User, start: NodeId, path: &str, mut visit: F) -> Result<Entry>
    where
        F: FnMut(&Entry, &INode),
    {
        let mut node: INode = self
            .node_by_id(start)
            .ok_or(VfsError::new(ErrorKind::BadHandle, "walk"))?;
        let mut entry: Entry = Entry::new(THIS_DIR, start);

        for segment in path.split('/') {
            if segment.is_empty() || segment == THIS_DIR {
                continue;
            }

            if !node.user_can(actor, Permissions::READ) {
                return Err(VfsError::new(ErrorKind::PermissionDenied, "walk"));
            }

            entry = self
                .state
                .borrow()
                .lookup(entry.node_id, segment)
                .ok_or(VfsError::new(ErrorKind::NotFound, "walk"))?;

            // An edge pointing at a dangling id is a consistency bug, not
            // a lookup miss.
            node = self
                .node_by_id(entry.node_id)
                .ok_or(VfsError::new(ErrorKind::Inconsistency, "walk"))?;

            visit(&entry, &node);
        }

        Ok(entry)
    }

    /////////////////////////////////////////////////////////////
    // File and directory access
    /////////////////////////////////////////////////////////////

    /// Open a node for I/O with the requested permissions.
    ///
    /// Returns a [`File`] handle owning the driver's open token; the
    /// handle closes itself when dropped.
    pub fn open(&self, actor: User, id: NodeId, perms: Permissions) -> Result<File<'_>> {
        let token: OpenToken;
        let node: INode;
        {
            let state: &mut VfsState = &mut *self.state.borrow_mut();

            let mut snapshot: INode = *state
                .index
                .get(id)
                .ok_or(VfsError::new(ErrorKind::BadHandle, "open"))?;
            if !snapshot.user_can(actor, perms) {
                return Err(VfsError::new(ErrorKind::PermissionDenied, "open"));
            }

            let driver: &mut dyn Driver = state
                .driver_mut(snapshot.driver_id)
                .ok_or(VfsError::new(ErrorKind::Inconsistency, "open"))?;
            token = driver.open(&mut snapshot, perms)?;

            state.index.update(id, snapshot, "open")?;
            node = snapshot;
        }

        Ok(File::new(self, id, node, token))
    }

    /// Enumerate a directory's entries.
    ///
    /// The returned enumerator pins the directory alive (its link count is
    /// raised by one) until dropped, and iterates a snapshot of the
    /// entries taken here, in unspecified order.
    pub fn enumerate_directory(&self, actor: User, dir_id: NodeId) -> Result<DirEnumerator<'_>> {
        let entries: Vec<Entry>;
        {
            let state: &mut VfsState = &mut *self.state.borrow_mut();

            let dir_node: &INode = state
                .index
                .get(dir_id)
                .ok_or(VfsError::new(ErrorKind::BadHandle, "enumerate_directory"))?;
            if !dir_node.is_directory() {
                return Err(VfsError::new(ErrorKind::NotDirectory, "enumerate_directory"));
            }
            if !dir_node.user_can(actor, Permissions::READ) {
                return Err(VfsError::new(ErrorKind::PermissionDenied, "enumerate_directory"));
            }

            entries = state.dir_driver.entries_snapshot(dir_node)?;
            state.index.add_link(dir_id);
        }

        Ok(DirEnumerator::new(self, dir_id, entries))
    }

    /// Number of entries in a directory, 0 when `dir_id` is not one.
    pub fn count_entries(&self, dir_id: NodeId) -> usize {
        let state = self.state.borrow();
        match state.index.get(dir_id) {
            Some(dir_node) => state.dir_driver.count_entries(dir_node),
            None => 0,
        }
    }

    /////////////////////////////////////////////////////////////
    // Handle support
    /////////////////////////////////////////////////////////////

    /// Drop a reference previously taken with the index's link count
    /// (enumerator pin or directory edge).
    pub(crate) fn release_pin(&self, id: NodeId) {
        self.state.borrow_mut().release_node(id);
    }

    pub(crate) fn driver_read(
        &self,
        id: NodeId,
        token: OpenToken,
        node: &mut INode,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<usize> {
        let state: &mut VfsState = &mut *self.state.borrow_mut();
        let driver: &mut dyn Driver = state
            .driver_mut(node.driver_id)
            .ok_or(VfsError::new(ErrorKind::Inconsistency, "read"))?;

        let count: usize = driver.read(token, node, offset, dst)?;
        // The node may have been unlinked since the open; its slot is gone
        // then and the write-back is dropped on the floor.
        let _ = state.index.update(id, *node, "read");
        Ok(count)
    }

    pub(crate) fn driver_write(
        &self,
        id: NodeId,
        token: OpenToken,
        node: &mut INode,
        offset: u64,
        src: &[u8],
    ) -> Result<usize> {
        let state: &mut VfsState = &mut *self.state.borrow_mut();
        let driver: &mut dyn Driver = state
            .driver_mut(node.driver_id)
            .ok_or(VfsError::new(ErrorKind::Inconsistency, "write"))?;

        let count: usize = driver.write(token, node, offset, src)?;
        let _ = state.index.update(id, *node, "write");
        Ok(count)
    }

    pub(crate) fn driver_seek(
        &self,
        token: OpenToken,
        node: &mut INode,
        offset: u64,
        whence: Whence,
    ) -> Result<u64> {
        let state: &mut VfsState = &mut *self.state.borrow_mut();
        let driver: &mut dyn Driver = state
            .driver_mut(node.driver_id)
            .ok_or(VfsError::new(ErrorKind::Inconsistency, "seek"))?;

        driver.seek(token, node, offset, whence)
    }

    /// Best-effort write-back of a handle's cached snapshot.
    pub(crate) fn persist_node(&self, id: NodeId, node: &INode) {
        let _ = self.state.borrow_mut().index.update(id, *node, "flush");
    }

    /// Close a driver open session and persist the final snapshot. Called
    /// at most once per open, from the handle's drop.
    pub(crate) fn close_file(&self, id: NodeId, token: OpenToken, node: &mut INode) {
        let state: &mut VfsState = &mut *self.state.borrow_mut();
        if let Some(driver) = state.driver_mut(node.driver_id) {
            if let Err(err) = driver.close(token, node) {
                tracing::warn!("close failed: {}", err);
            }
        }

        let _ = state.index.update(id, *node, "close");
    }
}
