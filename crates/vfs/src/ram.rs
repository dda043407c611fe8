//! RAM-backed file driver.
//!
//! Stores each node's bytes in a growable in-memory buffer keyed by the
//! node's `driver_data`. A buffer whose node is destroyed while open
//! sessions still reference it is kept until the last of those sessions
//! closes, so handles opened before an unlink keep reading and writing the
//! same bytes.

use std::collections::HashMap;
use std::rc::Rc;

use crate::clock::{Clock, SystemClock};
use crate::driver::{Driver, OpenToken, Whence};
use crate::error::{ErrorKind, Result, VfsError};
use crate::inode::{INode, NodeKind};
use crate::perm::{FilePermissions, Permissions, User};

/// The single node kind this driver produces.
pub const RAM_FILE_KIND: NodeKind = 0;

fn is_ram_node(node: &INode) -> bool {
    node.kind == RAM_FILE_KIND
}

#[derive(Debug, Default)]
struct RamBuffer {
    data: Vec<u8>,
    /// Open sessions referencing this buffer.
    opens: u32,
    /// Node destroyed; free the buffer once `opens` drains to zero.
    doomed: bool,
}

/// In-memory storage driver for regular files.
pub struct RamDriver {
    buffers: HashMap<u64, RamBuffer>,
    next_data_id: u64,
    next_token: OpenToken,
    clock: Rc<dyn Clock>,
}

impl RamDriver {
    /// Create a driver stamping timestamps from the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Rc::new(SystemClock))
    }

    /// Create a driver with an injected time source.
    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            buffers: HashMap::new(),
            next_data_id: 0,
            next_token: 0,
            clock,
        }
    }

    fn buffer_mut(&mut self, node: &INode, op: &'static str) -> Result<&mut RamBuffer> {
        self.buffers
            .get_mut(&node.driver_data)
            .ok_or(VfsError::new(ErrorKind::BadHandle, op))
    }
}

impl Default for RamDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for RamDriver {
    fn default_permissions(&self, _kind: NodeKind) -> FilePermissions {
        FilePermissions(0o644)
    }

    fn create_node(
        &mut self,
        kind: NodeKind,
        owner: User,
        perms: FilePermissions,
    ) -> Result<INode> {
        if kind != RAM_FILE_KIND {
            return Err(VfsError::new(ErrorKind::WrongKind, "create_node"));
        }

        let data_id: u64 = self.next_data_id;
        self.next_data_id += 1;
        self.buffers.insert(data_id, RamBuffer::default());

        let now: u32 = self.clock.now();
        let mut node: INode = INode::new(kind, owner, perms);
        node.driver_data = data_id;
        node.atime = now;
        node.mtime = now;

        Ok(node)
    }

    fn destroy_node(&mut self, node: &mut INode) -> Result<()> {
        if !is_ram_node(node) {
            return Err(VfsError::new(ErrorKind::WrongKind, "destroy_node"));
        }

        if let Some(buffer) = self.buffers.get_mut(&node.driver_data) {
            if buffer.opens == 0 {
                self.buffers.remove(&node.driver_data);
            } else {
                buffer.doomed = true;
            }
        }

        Ok(())
    }

    fn open(&mut self, node: &mut INode, _perms: Permissions) -> Result<OpenToken> {
        if !is_ram_node(node) {
            return Err(VfsError::new(ErrorKind::WrongKind, "open"));
        }

        node.atime = self.clock.now();
        self.buffer_mut(node, "open")?.opens += 1;

        let token: OpenToken = self.next_token;
        self.next_token += 1;
        Ok(token)
    }

    fn read(
        &mut self,
        _token: OpenToken,
        node: &mut INode,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<usize> {
        if !is_ram_node(node) {
            return Err(VfsError::new(ErrorKind::WrongKind, "read"));
        }

        let buffer: &RamBuffer = self.buffer_mut(node, "read")?;
        if offset > buffer.data.len() as u64 {
            return Err(VfsError::new(ErrorKind::Overflow, "read"));
        }

        let start: usize = offset as usize;
        let count: usize = dst.len().min(buffer.data.len() - start);
        dst[..count].copy_from_slice(&buffer.data[start..start + count]);

        Ok(count)
    }

    fn write(
        &mut self,
        _token: OpenToken,
        node: &mut INode,
        offset: u64,
        src: &[u8],
    ) -> Result<usize> {
        if !is_ram_node(node) {
            return Err(VfsError::new(ErrorKind::WrongKind, "write"));
        }

        let now: u32 = self.clock.now();
        let buffer: &mut RamBuffer = self.buffer_mut(node, "write")?;
        if offset > buffer.data.len() as u64 {
            return Err(VfsError::new(ErrorKind::Overflow, "write"));
        }

        let start: usize = offset as usize;
        let end: usize = start + src.len();
        if buffer.data.len() < end {
            buffer.data.resize(end, 0);
        }
        buffer.data[start..end].copy_from_slice(src);

        node.size = buffer.data.len() as u64;
        node.mtime = now;

        Ok(src.len())
    }

    fn seek(
        &mut self,
        _token: OpenToken,
        node: &mut INode,
        offset: u64,
        whence: Whence,
    ) -> Result<u64> {
        if !is_ram_node(node) {
            return Err(VfsError::new(ErrorKind::WrongKind, "seek"));
        }

        // The handle owns the cursors; both origins resolve the requested
        // offset as absolute.
        match whence {
            Whence::FromStart | Whence::Relative => Ok(offset),
        }
    }

    fn close(&mut self, _token: OpenToken, node: &mut INode) -> Result<()> {
        if !is_ram_node(node) {
            return Err(VfsError::new(ErrorKind::WrongKind, "close"));
        }

        if let Some(buffer) = self.buffers.get_mut(&node.driver_data) {
            buffer.opens = buffer.opens.saturating_sub(1);
            if buffer.doomed && buffer.opens == 0 {
                self.buffers.remove(&node.driver_data);
            }
        }

        Ok(())
    }
}
