//! In-memory virtual filesystem.
//!
//! A VFS is a named directed graph: directories are the vertices, every
//! other node is a leaf whose bytes live in a pluggable storage driver.
//! Nodes carry Unix-style ownership and permissions, handles are
//! generational so stale ids fail cleanly instead of aliasing, and open
//! files keep working against driver storage even after an unlink.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: Handles (File, DirEnumerator)
//! Layer 2: Facade (Vfs: permissions, walk, linking, dispatch)
//! Layer 1: Primitives (NodeIndex, DirectoryDriver, Driver back-ends)
//! ```
//!
//! # Example
//!
//! ```
//! use graphfs::{FilePermissions, Permissions, RamDriver, User, Vfs, RAM_FILE_KIND};
//!
//! let owner = User { uid: 0, gid: 0 };
//! let vfs = Vfs::new(owner, FilePermissions(0o755));
//! let ram = vfs.register_driver(RamDriver::new());
//!
//! let id = vfs
//!     .mknode(vfs.root_id(), "hello", ram, RAM_FILE_KIND, owner, FilePermissions(0o644))
//!     .unwrap();
//!
//! let mut file = vfs.open(owner, id, Permissions::WRITE).unwrap();
//! file.write(b"hello world").unwrap();
//! assert_eq!(file.size(), 11);
//! ```

pub mod clock;
pub mod dir;
pub mod driver;
pub mod error;
pub mod file;
mod index;
pub mod inode;
pub mod perm;
pub mod ram;
pub mod vfs;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dir::{DirEnumerator, DirectoryDriver, Entry};
pub use driver::{Driver, OpenToken, Whence};
pub use error::{ErrorKind, Result, VfsError};
pub use file::File;
pub use inode::{
    DriverId, INode, NodeId, NodeKind, DIRECTORY_DRIVER, DIRECTORY_KIND, ROOT_ID,
};
pub use perm::{
    can_user_perform_action, FileMode, FilePermissions, Permissions, User, S_IFDIR,
};
pub use ram::{RamDriver, RAM_FILE_KIND};
pub use vfs::{Vfs, PARENT_DIR, THIS_DIR};
