//! Generational node index.
//!
//! A slot array where each slot carries a lifetime generation. Slots are
//! tombstoned on release, never compacted: erasing in place would shift
//! every later slot and silently re-address outstanding handles. Freed
//! slots go on a free list for reuse; generations come from a VFS-wide
//! monotonic counter, so no `(index, generation)` pair ever repeats.

use crate::error::{ErrorKind, Result, VfsError};
use crate::inode::{INode, NodeId};

/// One index slot: the current generation plus the inode, if live.
#[derive(Debug)]
struct Slot {
    generation: u32,
    inode: Option<INode>,
}

/// What [`NodeIndex::release`] did with the slot.
#[derive(Debug)]
pub(crate) enum Release {
    /// The id did not resolve; nothing happened.
    Missing,
    /// The link count dropped but the node is still referenced.
    StillLinked,
    /// The last reference went away; the slot is tombstoned and the freed
    /// inode is handed back so the caller can run driver destruction.
    Freed(INode),
}

#[derive(Debug, Default)]
pub(crate) struct NodeIndex {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_generation: u32,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_generation(&mut self) -> u32 {
        let generation: u32 = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Store `inode` in a free slot (or a new one) and return its handle.
    pub fn allocate(&mut self, inode: INode) -> NodeId {
        let generation: u32 = self.fresh_generation();

        let index: u32 = match self.free.pop() {
            Some(index) => {
                let slot: &mut Slot = &mut self.slots[index as usize];
                slot.generation = generation;
                slot.inode = Some(inode);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation,
                    inode: Some(inode),
                });
                (self.slots.len() - 1) as u32
            }
        };

        NodeId::new(index, generation)
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Resolve a handle. `None` when the index is out of range, the
    /// generation is stale, or the slot is tombstoned.
    pub fn get(&self, id: NodeId) -> Option<&INode> {
        self.slot(id).and_then(|slot| slot.inode.as_ref())
    }

    /// Overwrite a live slot's inode.
    ///
    /// Driver and kind are immutable post-creation, and the link count is
    /// owned by the index: a caller persisting a stale snapshot must not
    /// be able to rewrite link accounting.
    pub fn update(&mut self, id: NodeId, inode: INode, op: &'static str) -> Result<()> {
        let slot: &mut Slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(VfsError::new(ErrorKind::BadHandle, op))?;

        let current: &mut INode = slot
            .inode
            .as_mut()
            .ok_or(VfsError::new(ErrorKind::BadHandle, op))?;

        if current.driver_id != inode.driver_id || current.kind != inode.kind {
            return Err(VfsError::new(ErrorKind::BadHandle, op));
        }

        let n_links: u32 = current.n_links;
        *current = inode;
        current.n_links = n_links;

        Ok(())
    }

    /// Increment the link count. Returns false if the id does not resolve.
    pub fn add_link(&mut self, id: NodeId) -> bool {
        match self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.inode.as_mut())
        {
            Some(inode) => {
                inode.n_links += 1;
                true
            }
            None => false,
        }
    }

    /// Decrement the link count, tombstoning the slot when it reaches zero.
    pub fn release(&mut self, id: NodeId) -> Release {
        let Some(slot) = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
        else {
            return Release::Missing;
        };

        let Some(inode) = slot.inode.as_mut() else {
            return Release::Missing;
        };

        inode.n_links = inode.n_links.saturating_sub(1);
        if inode.n_links > 0 {
            return Release::StillLinked;
        }

        let freed: INode = slot.inode.take().expect("slot checked live above");
        let index: u32 = id.index;
        slot.generation = self.next_generation;
        self.next_generation += 1;
        self.free.push(index);

        Release::Freed(freed)
    }

    /// Iterate live nodes with their handles.
    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &INode)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.inode
                .as_ref()
                .map(|inode| (NodeId::new(index as u32, slot.generation), inode))
        })
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.inode.is_some()).count()
    }
}
