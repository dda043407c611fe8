//! End-to-end scenarios over the public VFS surface.
//!
//! Covered here:
//! - permission inheritance at node creation
//! - I/O on handles whose node was unlinked mid-session
//! - enumerator pinning of directories under iteration
//! - path walking, including permission failures along the way
//! - generational handle safety across slot reuse
//! - link-count bookkeeping round trips

use std::cell::Cell;
use std::rc::Rc;

use graphfs::{
    Driver, ErrorKind, FilePermissions, INode, NodeId, NodeKind, OpenToken, Permissions,
    RamDriver, Result, User, Vfs, Whence, RAM_FILE_KIND,
};

const OWNER: User = User { uid: 0, gid: 0 };

/// VFS with a permissive root and a registered RAM driver.
fn ram_vfs() -> (Vfs, u32) {
    let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o777));
    let ram: u32 = vfs.register_driver(RamDriver::new());
    (vfs, ram)
}

/// RAM-backed driver whose permission base leaves every bit to the parent.
struct WideBaseDriver(RamDriver);

impl Driver for WideBaseDriver {
    fn default_permissions(&self, _kind: NodeKind) -> FilePermissions {
        FilePermissions(0o777)
    }

    fn create_node(&mut self, kind: NodeKind, owner: User, perms: FilePermissions)
        -> Result<INode> {
        self.0.create_node(kind, owner, perms)
    }

    fn destroy_node(&mut self, node: &mut INode) -> Result<()> {
        self.0.destroy_node(node)
    }

    fn open(&mut self, node: &mut INode, perms: Permissions) -> Result<OpenToken> {
        self.0.open(node, perms)
    }

    fn read(&mut self, token: OpenToken, node: &mut INode, offset: u64, dst: &mut [u8])
        -> Result<usize> {
        self.0.read(token, node, offset, dst)
    }

    fn write(&mut self, token: OpenToken, node: &mut INode, offset: u64, src: &[u8])
        -> Result<usize> {
        self.0.write(token, node, offset, src)
    }

    fn seek(&mut self, token: OpenToken, node: &mut INode, offset: u64, whence: Whence)
        -> Result<u64> {
        self.0.seek(token, node, offset, whence)
    }

    fn close(&mut self, token: OpenToken, node: &mut INode) -> Result<()> {
        self.0.close(token, node)
    }
}

/// RAM-backed driver counting its open and close calls.
struct CountingDriver {
    inner: RamDriver,
    opens: Rc<Cell<usize>>,
    closes: Rc<Cell<usize>>,
}

impl CountingDriver {
    fn new() -> (Self, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let opens: Rc<Cell<usize>> = Rc::new(Cell::new(0));
        let closes: Rc<Cell<usize>> = Rc::new(Cell::new(0));
        let driver: CountingDriver = CountingDriver {
            inner: RamDriver::new(),
            opens: opens.clone(),
            closes: closes.clone(),
        };
        (driver, opens, closes)
    }
}

impl Driver for CountingDriver {
    fn default_permissions(&self, kind: NodeKind) -> FilePermissions {
        self.inner.default_permissions(kind)
    }

    fn create_node(&mut self, kind: NodeKind, owner: User, perms: FilePermissions)
        -> Result<INode> {
        self.inner.create_node(kind, owner, perms)
    }

    fn destroy_node(&mut self, node: &mut INode) -> Result<()> {
        self.inner.destroy_node(node)
    }

    fn open(&mut self, node: &mut INode, perms: Permissions) -> Result<OpenToken> {
        self.opens.set(self.opens.get() + 1);
        self.inner.open(node, perms)
    }

    fn read(&mut self, token: OpenToken, node: &mut INode, offset: u64, dst: &mut [u8])
        -> Result<usize> {
        self.inner.read(token, node, offset, dst)
    }

    fn write(&mut self, token: OpenToken, node: &mut INode, offset: u64, src: &[u8])
        -> Result<usize> {
        self.inner.write(token, node, offset, src)
    }

    fn seek(&mut self, token: OpenToken, node: &mut INode, offset: u64, whence: Whence)
        -> Result<u64> {
        self.inner.seek(token, node, offset, whence)
    }

    fn close(&mut self, token: OpenToken, node: &mut INode) -> Result<()> {
        self.closes.set(self.closes.get() + 1);
        self.inner.close(token, node)
    }
}

// =============================================================================
// PERMISSION INHERITANCE
// =============================================================================

mod permission_inheritance {
    use super::*;

    #[test]
    fn test_parent_mode_masks_driver_base() {
        // Root 0o640, driver base 0o777: every requested bit is restricted
        // by the parent's mode.
        let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o640));
        let wide: u32 = vfs.register_driver(WideBaseDriver(RamDriver::new()));

        let id: NodeId = vfs
            .mknode(vfs.root_id(), "data", wide, RAM_FILE_KIND, OWNER, FilePermissions(0o777))
            .unwrap();

        let node: INode = vfs.node_by_id(id).unwrap();
        assert_eq!(node.perms, FilePermissions(0o640));
    }

    #[test]
    fn test_bits_outside_base_pass_through() {
        // RAM driver base is 0o644: only those bits are restricted by the
        // parent; the rest of the request survives as-is.
        let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o600));
        let ram: u32 = vfs.register_driver(RamDriver::new());

        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o777))
            .unwrap();

        // 0o777 & (!0o644 | (0o600 & 0o644)) == 0o733
        let node: INode = vfs.node_by_id(id).unwrap();
        assert_eq!(node.perms, FilePermissions(0o733));
    }

    #[test]
    fn test_creation_denied_without_directory_write() {
        let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o640));
        let ram: u32 = vfs.register_driver(RamDriver::new());
        let stranger: User = User { uid: 9, gid: 9 };

        let err = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, stranger, FilePermissions(0o644))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(vfs.lookup(vfs.root_id(), "f").is_none());
    }
}

// =============================================================================
// UNLINK WHILE OPEN
// =============================================================================

mod unlink_while_open {
    use super::*;

    #[test]
    fn test_handle_survives_unlink() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let mut file = vfs.open(OWNER, id, Permissions::WRITE).unwrap();
        vfs.unlink(OWNER, vfs.root_id(), "f").unwrap();

        // The node is gone from the index but the driver session lives on.
        assert!(vfs.node_by_id(id).is_none());
        assert_eq!(file.write(b"thirteen-byte").unwrap(), 13);
        assert_eq!(file.size(), 13);

        let mut buf: [u8; 13] = [0; 13];
        file.seek_read(0, Whence::FromStart).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 13);
        assert_eq!(&buf, b"thirteen-byte");
    }

    #[test]
    fn test_flush_after_unlink_is_tolerated() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let mut file = vfs.open(OWNER, id, Permissions::WRITE).unwrap();
        file.write(b"x").unwrap();
        vfs.unlink(OWNER, vfs.root_id(), "f").unwrap();

        // Write-back has nowhere to land; neither flush nor drop may fail.
        file.flush();
    }
}

// =============================================================================
// DIRECTORY ENUMERATION
// =============================================================================

mod enumeration {
    use super::*;

    #[test]
    fn test_enumeration_matches_lookup() {
        let (vfs, ram) = ram_vfs();
        let dir: NodeId = vfs
            .create_directory(vfs.root_id(), "d", OWNER, FilePermissions(0o755))
            .unwrap();
        for name in ["a", "b", "c"] {
            vfs.mknode(dir, name, ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
                .unwrap();
        }

        let seen: Vec<(String, NodeId)> = vfs
            .enumerate_directory(OWNER, dir)
            .unwrap()
            .map(|entry| (entry.name.clone(), entry.node_id))
            .collect();

        assert_eq!(seen.len(), 3);
        for (name, node_id) in &seen {
            let entry = vfs.lookup(dir, name).unwrap();
            assert_eq!(entry.node_id, *node_id);
        }
        assert!(vfs.lookup(dir, "missing").is_none());
    }

    #[test]
    fn test_enumerator_pins_directory() {
        let (vfs, ram) = ram_vfs();
        let dir: NodeId = vfs
            .create_directory(vfs.root_id(), "d", OWNER, FilePermissions(0o755))
            .unwrap();
        for name in ["a", "b", "c"] {
            vfs.mknode(dir, name, ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
                .unwrap();
        }

        let enumerator = vfs.enumerate_directory(OWNER, dir).unwrap();

        // Still populated: unlinking the directory is refused.
        let err = vfs.unlink(OWNER, vfs.root_id(), "d").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);

        for name in ["a", "b", "c"] {
            vfs.unlink(OWNER, dir, name).unwrap();
        }

        // Empty now: the edge goes away, but the enumerator's pin keeps
        // the node alive.
        vfs.unlink(OWNER, vfs.root_id(), "d").unwrap();
        assert!(vfs.node_by_id(dir).is_some());

        drop(enumerator);
        assert!(vfs.node_by_id(dir).is_none());
    }

    #[test]
    fn test_enumerator_iterates_construction_snapshot() {
        let (vfs, ram) = ram_vfs();
        let dir: NodeId = vfs
            .create_directory(vfs.root_id(), "d", OWNER, FilePermissions(0o755))
            .unwrap();
        vfs.mknode(dir, "before", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let enumerator = vfs.enumerate_directory(OWNER, dir).unwrap();
        vfs.mknode(dir, "after", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let names: Vec<String> = enumerator.map(|entry| entry.name).collect();
        assert_eq!(names, vec!["before".to_string()]);
    }

    #[test]
    fn test_enumerate_requires_read() {
        let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o700));
        let stranger: User = User { uid: 9, gid: 9 };

        let err = vfs.enumerate_directory(stranger, vfs.root_id()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        // The denied attempt must not leave a pin behind.
        assert_eq!(vfs.node_by_id(vfs.root_id()).unwrap().n_links, 1);
    }

    #[test]
    fn test_enumerate_non_directory() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let err = vfs.enumerate_directory(OWNER, id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotDirectory);

        let ghost: NodeId = NodeId::new(99, 0);
        let err = vfs.enumerate_directory(OWNER, ghost).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHandle);
    }
}

// =============================================================================
// WALK
// =============================================================================

mod walk {
    use super::*;

    /// Build `/a/b/c` directories with a RAM file `f` in the deepest one.
    fn deep_tree(vfs: &Vfs, ram: u32, dir_perms: u32) -> NodeId {
        let a: NodeId = vfs
            .create_directory(vfs.root_id(), "a", OWNER, FilePermissions(0o755))
            .unwrap();
        let b: NodeId = vfs
            .create_directory(a, "b", OWNER, FilePermissions(dir_perms))
            .unwrap();
        let c: NodeId = vfs
            .create_directory(b, "c", OWNER, FilePermissions(0o755))
            .unwrap();
        vfs.mknode(c, "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap()
    }

    #[test]
    fn test_walk_visits_every_step() {
        let (vfs, ram) = ram_vfs();
        let file_id: NodeId = deep_tree(&vfs, ram, 0o755);

        let mut visited: Vec<String> = Vec::new();
        let entry = vfs
            .walk(OWNER, vfs.root_id(), "a/b/c/f", |step, _node| {
                visited.push(step.name.clone());
            })
            .unwrap();

        assert_eq!(visited, vec!["a", "b", "c", "f"]);
        assert_eq!(entry.name, "f");
        assert_eq!(entry.node_id, file_id);
    }

    #[test]
    fn test_walk_permission_denied_midway() {
        let (vfs, ram) = ram_vfs();
        deep_tree(&vfs, ram, 0o700);
        let stranger: User = User { uid: 9, gid: 9 };

        let err = vfs.walk_from_root(stranger, "a/b/c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_walk_missing_segment() {
        let (vfs, ram) = ram_vfs();
        deep_tree(&vfs, ram, 0o755);

        let err = vfs.walk_from_root(OWNER, "a/b/ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_walk_empty_path_resolves_to_start() {
        let (vfs, _ram) = ram_vfs();

        let entry = vfs.walk_from_root(OWNER, "").unwrap();
        assert_eq!(entry.name, ".");
        assert_eq!(entry.node_id, vfs.root_id());
    }

    #[test]
    fn test_walk_skips_dot_and_empty_segments() {
        let (vfs, ram) = ram_vfs();
        let file_id: NodeId = deep_tree(&vfs, ram, 0o755);

        let entry = vfs.walk_from_root(OWNER, "./a//b/./c/f").unwrap();
        assert_eq!(entry.node_id, file_id);
    }

    #[test]
    fn test_walk_from_missing_start() {
        let (vfs, _ram) = ram_vfs();
        let ghost: NodeId = NodeId::new(7, 7);

        let err = vfs.walk(OWNER, ghost, "a", |_, _| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHandle);
    }
}

// =============================================================================
// GENERATION SAFETY
// =============================================================================

mod generation_safety {
    use super::*;

    #[test]
    fn test_stale_id_never_aliases_slot_reuse() {
        let (vfs, ram) = ram_vfs();

        let old: NodeId = vfs
            .mknode(vfs.root_id(), "n", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();
        vfs.unlink(OWNER, vfs.root_id(), "n").unwrap();

        let new: NodeId = vfs
            .mknode(vfs.root_id(), "m", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        // The slot may be reused; the generation may not.
        assert_eq!(new.index, old.index);
        assert_ne!(new.generation, old.generation);
        assert!(vfs.node_by_id(old).is_none());
        assert!(vfs.node_by_id(new).is_some());
    }

    #[test]
    fn test_unlink_advances_generation() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "n", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();
        assert_eq!(vfs.node_by_id(id).unwrap().n_links, 1);

        vfs.unlink(OWNER, vfs.root_id(), "n").unwrap();
        assert!(vfs.node_by_id(id).is_none());
        assert!(vfs.size(id).is_none());
    }
}

// =============================================================================
// LINKS AND ROUND TRIPS
// =============================================================================

mod links {
    use super::*;

    #[test]
    fn test_n_names_unlink_all_but_one() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "name0", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        for i in 1..5 {
            vfs.link(OWNER, &format!("name{}", i), vfs.root_id(), id)
                .unwrap();
        }
        assert_eq!(vfs.node_by_id(id).unwrap().n_links, 5);

        for i in 0..4 {
            vfs.unlink(OWNER, vfs.root_id(), &format!("name{}", i))
                .unwrap();
        }

        let node: INode = vfs.node_by_id(id).unwrap();
        assert_eq!(node.n_links, 1);
        assert_eq!(vfs.lookup(vfs.root_id(), "name4").unwrap().node_id, id);
    }

    #[test]
    fn test_duplicate_link_name_rejected() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let err = vfs.link(OWNER, "f", vfs.root_id(), id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(vfs.node_by_id(id).unwrap().n_links, 1);
    }

    #[test]
    fn test_link_counts_match_directory_edges() {
        let (vfs, ram) = ram_vfs();
        let dir: NodeId = vfs
            .create_directory(vfs.root_id(), "d", OWNER, FilePermissions(0o755))
            .unwrap();
        let file: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();
        vfs.link(OWNER, "f-alias", dir, file).unwrap();

        // Count inbound edges per node over all directories.
        let mut edges: Vec<NodeId> = Vec::new();
        for dir_id in [vfs.root_id(), dir] {
            let entries: Vec<NodeId> = vfs
                .enumerate_directory(OWNER, dir_id)
                .unwrap()
                .map(|entry| entry.node_id)
                .collect();
            edges.extend(entries);
        }

        for id in [dir, file] {
            let expected: u32 = edges.iter().filter(|&&edge| edge == id).count() as u32;
            assert_eq!(vfs.node_by_id(id).unwrap().n_links, expected);
        }
    }
}

// =============================================================================
// FILE I/O
// =============================================================================

mod file_io {
    use super::*;

    #[test]
    fn test_write_then_seek_then_read_round_trip() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let mut file = vfs
            .open(OWNER, id, Permissions::READ | Permissions::WRITE)
            .unwrap();
        assert_eq!(file.write(b"round trip").unwrap(), 10);

        assert_eq!(file.seek_read(0, Whence::FromStart).unwrap(), 0);
        let mut buf: [u8; 10] = [0; 10];
        assert_eq!(file.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf, b"round trip");

        // Size is persisted to the index too.
        assert_eq!(vfs.size(id), Some(10));
        assert_eq!(vfs.node_by_id(id).unwrap().size, 10);
    }

    #[test]
    fn test_read_and_write_offsets_are_independent() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let mut file = vfs
            .open(OWNER, id, Permissions::READ | Permissions::WRITE)
            .unwrap();
        file.write(b"abcdef").unwrap();

        // Reading from 0 does not disturb the write cursor.
        let mut buf: [u8; 3] = [0; 3];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");

        file.write(b"ghi").unwrap();
        file.seek_read(0, Whence::FromStart).unwrap();
        let mut all: [u8; 9] = [0; 9];
        assert_eq!(file.read(&mut all).unwrap(), 9);
        assert_eq!(&all, b"abcdefghi");
    }

    #[test]
    fn test_open_checks_node_permissions() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o600))
            .unwrap();
        let stranger: User = User { uid: 9, gid: 9 };

        let err = vfs.open(stranger, id, Permissions::READ).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let ghost: NodeId = NodeId::new(50, 1);
        let err = vfs.open(OWNER, ghost, Permissions::READ).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadHandle);
    }

    #[test]
    fn test_stat_reflects_cached_snapshot() {
        let (vfs, ram) = ram_vfs();
        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", ram, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let mut file = vfs.open(OWNER, id, Permissions::WRITE).unwrap();
        file.write(b"1234").unwrap();

        let stat: INode = file.stat();
        assert_eq!(stat.size, 4);
        assert_eq!(stat.owner, OWNER);
    }
}

// =============================================================================
// HANDLE LIFECYCLE
// =============================================================================

mod handle_lifecycle {
    use super::*;

    #[test]
    fn test_drop_closes_exactly_once() {
        let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o777));
        let (driver, opens, closes) = CountingDriver::new();
        let counting: u32 = vfs.register_driver(driver);

        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", counting, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        {
            let file = vfs.open(OWNER, id, Permissions::READ).unwrap();
            assert_eq!(opens.get(), 1);
            assert_eq!(closes.get(), 0);

            // Moving the handle must not trigger an intermediate close.
            let moved = file;
            drop(moved);
        }

        assert_eq!(opens.get(), 1);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_two_handles_two_closes() {
        let vfs: Vfs = Vfs::new(OWNER, FilePermissions(0o777));
        let (driver, opens, closes) = CountingDriver::new();
        let counting: u32 = vfs.register_driver(driver);

        let id: NodeId = vfs
            .mknode(vfs.root_id(), "f", counting, RAM_FILE_KIND, OWNER, FilePermissions(0o644))
            .unwrap();

        let first = vfs.open(OWNER, id, Permissions::READ).unwrap();
        let second = vfs.open(OWNER, id, Permissions::READ).unwrap();
        drop(first);
        drop(second);

        assert_eq!(opens.get(), 2);
        assert_eq!(closes.get(), 2);
    }
}
