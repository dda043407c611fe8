//! Built-in directory driver.
//!
//! Directories are nodes like any other, but their driver is privileged:
//! the facade holds it as a direct field, dispatches all graph edits to it,
//! and reserves driver id 0 for it. Per directory node, `driver_data`
//! names an adjacency map from entry name to target node.

use std::collections::HashMap;

use crate::driver::{Driver, OpenToken, Whence};
use crate::error::{ErrorKind, Result, VfsError};
use crate::inode::{INode, NodeId, NodeKind, DIRECTORY_KIND};
use crate::perm::{FilePermissions, Permissions, User};
use crate::vfs::Vfs;

/// A directory entry: a named edge to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub node_id: NodeId,
}

impl Entry {
    pub fn new(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            node_id,
        }
    }
}

/// Nominal size reported for directory nodes.
const DIRECTORY_SIZE: u64 = 4096;

fn is_directory_node(node: &INode) -> bool {
    node.kind == DIRECTORY_KIND
}

/// The built-in driver serving directory nodes.
#[derive(Debug, Default)]
pub struct DirectoryDriver {
    /// Named graph edges, keyed by each directory node's `driver_data`.
    adjacency: HashMap<u64, HashMap<String, NodeId>>,
    next_data_id: u64,
}

impl DirectoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, dir_node: &INode, op: &'static str) -> Result<&HashMap<String, NodeId>> {
        if !is_directory_node(dir_node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, op));
        }

        self.adjacency
            .get(&dir_node.driver_data)
            .ok_or(VfsError::new(ErrorKind::NotFound, op))
    }

    /// Insert a named edge. Fails `AlreadyExists` when the name is taken.
    pub fn add_entry(&mut self, dir_node: &INode, name: &str, target: NodeId) -> Result<()> {
        if !is_directory_node(dir_node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "add_entry"));
        }

        let entries: &mut HashMap<String, NodeId> = self
            .adjacency
            .get_mut(&dir_node.driver_data)
            .ok_or(VfsError::new(ErrorKind::NotFound, "add_entry"))?;

        if entries.contains_key(name) {
            return Err(VfsError::new(ErrorKind::AlreadyExists, "add_entry"));
        }

        entries.insert(name.to_string(), target);
        Ok(())
    }

    /// Remove a named edge, returning its target. An absent name is not an
    /// error.
    pub fn remove_entry(&mut self, dir_node: &INode, name: &str) -> Result<Option<NodeId>> {
        if !is_directory_node(dir_node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "remove_entry"));
        }

        let entries: &mut HashMap<String, NodeId> = self
            .adjacency
            .get_mut(&dir_node.driver_data)
            .ok_or(VfsError::new(ErrorKind::NotFound, "remove_entry"))?;

        Ok(entries.remove(name))
    }

    /// Case-sensitive exact-match lookup. Does not mutate.
    pub fn lookup(&self, dir_node: &INode, name: &str) -> Option<Entry> {
        self.entries(dir_node, "lookup")
            .ok()?
            .get(name)
            .map(|&node_id| Entry::new(name, node_id))
    }

    /// Number of entries in the directory, 0 if the node is not one.
    pub fn count_entries(&self, dir_node: &INode) -> usize {
        self.entries(dir_node, "count_entries")
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Snapshot the directory's entries in unspecified order.
    pub fn entries_snapshot(&self, dir_node: &INode) -> Result<Vec<Entry>> {
        let entries: &HashMap<String, NodeId> = self.entries(dir_node, "enumerate_directory")?;

        Ok(entries
            .iter()
            .map(|(name, &node_id)| Entry::new(name.clone(), node_id))
            .collect())
    }
}

impl Driver for DirectoryDriver {
    fn default_permissions(&self, _kind: NodeKind) -> FilePermissions {
        FilePermissions(0o666)
    }

    fn create_node(
        &mut self,
        kind: NodeKind,
        owner: User,
        perms: FilePermissions,
    ) -> Result<INode> {
        if kind != DIRECTORY_KIND {
            return Err(VfsError::new(ErrorKind::WrongKind, "create_node"));
        }

        let data_id: u64 = self.next_data_id;
        self.next_data_id += 1;
        self.adjacency.insert(data_id, HashMap::new());

        let mut node: INode = INode::new(kind, owner, perms);
        node.driver_data = data_id;
        node.size = DIRECTORY_SIZE;

        Ok(node)
    }

    fn destroy_node(&mut self, node: &mut INode) -> Result<()> {
        if !is_directory_node(node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "destroy_node"));
        }

        self.adjacency.remove(&node.driver_data);
        Ok(())
    }

    fn open(&mut self, node: &mut INode, perms: Permissions) -> Result<OpenToken> {
        if !is_directory_node(node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "open"));
        }

        if perms.can(Permissions::READ) || perms.can(Permissions::WRITE) {
            return Ok(0);
        }

        Err(VfsError::new(ErrorKind::PermissionDenied, "open"))
    }

    fn read(
        &mut self,
        _token: OpenToken,
        node: &mut INode,
        _offset: u64,
        _dst: &mut [u8],
    ) -> Result<usize> {
        if !is_directory_node(node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "read"));
        }

        Err(VfsError::new(ErrorKind::IsDirectory, "read"))
    }

    fn write(
        &mut self,
        _token: OpenToken,
        node: &mut INode,
        _offset: u64,
        _src: &[u8],
    ) -> Result<usize> {
        if !is_directory_node(node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "write"));
        }

        Err(VfsError::new(ErrorKind::IsDirectory, "write"))
    }

    fn seek(
        &mut self,
        _token: OpenToken,
        node: &mut INode,
        _offset: u64,
        _whence: Whence,
    ) -> Result<u64> {
        if !is_directory_node(node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "seek"));
        }

        Err(VfsError::new(ErrorKind::IsDirectory, "seek"))
    }

    fn close(&mut self, _token: OpenToken, node: &mut INode) -> Result<()> {
        if !is_directory_node(node) {
            return Err(VfsError::new(ErrorKind::NotDirectory, "close"));
        }

        Ok(())
    }
}

/// Iterator over a directory's entries.
///
/// Construction raises the directory's link count by one and the drop
/// releases it again, so the directory outlives the enumerator even when
/// its last edge is unlinked mid-iteration. Iterates the snapshot taken at
/// construction; later modifications through the same VFS are not
/// observed.
pub struct DirEnumerator<'v> {
    vfs: &'v Vfs,
    dir_id: NodeId,
    entries: std::vec::IntoIter<Entry>,
}

impl std::fmt::Debug for DirEnumerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEnumerator")
            .field("dir_id", &self.dir_id)
            .field("entries", &self.entries.as_slice())
            .finish()
    }
}

impl<'v> DirEnumerator<'v> {
    /// The pin on `dir_id` must already be taken when this is called.
    pub(crate) fn new(vfs: &'v Vfs, dir_id: NodeId, entries: Vec<Entry>) -> Self {
        Self {
            vfs,
            dir_id,
            entries: entries.into_iter(),
        }
    }

    /// Handle of the directory being enumerated.
    pub fn directory_id(&self) -> NodeId {
        self.dir_id
    }
}

impl Iterator for DirEnumerator<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl Drop for DirEnumerator<'_> {
    fn drop(&mut self) {
        self.vfs.release_pin(self.dir_id);
    }
}
