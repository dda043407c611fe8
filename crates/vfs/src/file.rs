//! Open-file handle.

use crate::driver::{OpenToken, Whence};
use crate::error::Result;
use crate::inode::{INode, NodeId};
use crate::vfs::Vfs;

/// A file-like object over an open driver session.
///
/// Holds the node's id, a cached metadata snapshot and the driver's open
/// token, plus independent read and write offsets so interleaved reads and
/// writes never collide in offset state. Every operation works on the
/// cached snapshot and persists it back through the VFS afterwards; once
/// the node is unlinked the write-back quietly stops landing while I/O
/// continues against the driver's storage.
///
/// The handle borrows the VFS, so it cannot outlive it, and it is movable
/// but not copyable: moving transfers the open token, and the driver's
/// `close` runs exactly once, when the handle is dropped.
pub struct File<'v> {
    vfs: &'v Vfs,
    node_id: NodeId,
    cached: INode,
    token: OpenToken,
    read_offset: u64,
    write_offset: u64,
}

impl std::fmt::Debug for File<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("node_id", &self.node_id)
            .field("cached", &self.cached)
            .field("token", &self.token)
            .field("read_offset", &self.read_offset)
            .field("write_offset", &self.write_offset)
            .finish()
    }
}

impl<'v> File<'v> {
    pub(crate) fn new(vfs: &'v Vfs, node_id: NodeId, cached: INode, token: OpenToken) -> Self {
        Self {
            vfs,
            node_id,
            cached,
            token,
            read_offset: 0,
            write_offset: 0,
        }
    }

    /// The handle's node id. May no longer resolve after an unlink.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Read at the current read offset, advancing it by the bytes read.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let count: usize = self.vfs.driver_read(
            self.node_id,
            self.token,
            &mut self.cached,
            self.read_offset,
            dst,
        )?;
        self.read_offset += count as u64;

        Ok(count)
    }

    /// Write at the current write offset, advancing it by the bytes
    /// written.
    pub fn write(&mut self, src: &[u8]) -> Result<usize> {
        let count: usize = self.vfs.driver_write(
            self.node_id,
            self.token,
            &mut self.cached,
            self.write_offset,
            src,
        )?;
        self.write_offset += count as u64;

        Ok(count)
    }

    /// Reposition the read offset; returns the resulting absolute offset.
    pub fn seek_read(&mut self, offset: u64, whence: Whence) -> Result<u64> {
        let position: u64 = self
            .vfs
            .driver_seek(self.token, &mut self.cached, offset, whence)?;
        self.read_offset = position;

        Ok(position)
    }

    /// Reposition the write offset; returns the resulting absolute offset.
    pub fn seek_write(&mut self, offset: u64, whence: Whence) -> Result<u64> {
        let position: u64 = self
            .vfs
            .driver_seek(self.token, &mut self.cached, offset, whence)?;
        self.write_offset = position;

        Ok(position)
    }

    /// The cached metadata snapshot.
    pub fn stat(&self) -> INode {
        self.cached
    }

    /// The cached data length.
    pub fn size(&self) -> u64 {
        self.cached.size
    }

    /// Re-persist the cached snapshot.
    pub fn flush(&self) {
        self.vfs.persist_node(self.node_id, &self.cached);
    }
}

impl Drop for File<'_> {
    fn drop(&mut self) {
        self.vfs
            .close_file(self.node_id, self.token, &mut self.cached);
    }
}
