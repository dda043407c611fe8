//! Permission primitives: rwx bit fields, three-tier file permissions and
//! the user-vs-ACL check.

use serde::{Deserialize, Serialize};

/// Single-tier rwx permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(pub u8);

impl Permissions {
    /// Mode bit for read permission.
    pub const READ: Permissions = Permissions(0o4);
    /// Mode bit for write permission.
    pub const WRITE: Permissions = Permissions(0o2);
    /// Mode bit for execute permission.
    pub const EXEC: Permissions = Permissions(0o1);

    /// Check that every bit of `requested` is set in `self`.
    pub const fn can(self, requested: Permissions) -> bool {
        (self.0 & requested.0) == requested.0
    }

    pub const fn is_readable(self) -> bool {
        self.can(Self::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.can(Self::WRITE)
    }

    pub const fn is_executable(self) -> bool {
        self.can(Self::EXEC)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

/// Unix-style 9-bit file permissions: `rwxrwxrwx` over
/// {owner, owner's group, others}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermissions(pub u32);

impl FilePermissions {
    /// Mode bits of the owner tier.
    pub const OWNER: u32 = 0o700;
    /// Mode bits of the group tier.
    pub const GROUP: u32 = 0o070;
    /// Mode bits of the others tier.
    pub const OTHERS: u32 = 0o007;

    /// Assemble from per-tier rwx values.
    pub const fn from_tiers(owner: Permissions, group: Permissions, others: Permissions) -> Self {
        Self(((owner.0 as u32) << 6) | ((group.0 as u32) << 3) | (others.0 as u32))
    }

    pub const fn owner(self) -> Permissions {
        Permissions(((self.0 & Self::OWNER) >> 6) as u8)
    }

    pub const fn group(self) -> Permissions {
        Permissions(((self.0 & Self::GROUP) >> 3) as u8)
    }

    pub const fn others(self) -> Permissions {
        Permissions((self.0 & Self::OTHERS) as u8)
    }
}

/// An actor: the credentials operations are permission-checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
}

/// Check whether `actor` may perform `action` on an object owned by `owner`
/// with access control `acl`.
///
/// Tier selection: owner tier if the uids match, else group tier if the
/// gids match, else the others tier.
pub const fn can_user_perform_action(
    owner: User,
    acl: FilePermissions,
    actor: User,
    action: Permissions,
) -> bool {
    let tier: Permissions = if owner.uid == actor.uid {
        acl.owner()
    } else if owner.gid == actor.gid {
        acl.group()
    } else {
        acl.others()
    };

    tier.can(action)
}

/// Directory bit of the external mode encoding.
pub const S_IFDIR: u32 = 0o040000;

/// File type bits of the external mode encoding.
const IFMT: u32 = 0xF000;

/// Unix-style file mode word rendered for external observers.
///
/// The core stores only owner/permissions and driver/kind; callers that
/// need 9P-style flags map additional bits at their own boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMode(pub u32);

impl FileMode {
    /// Encode a directory or plain-file mode from permissions.
    pub const fn new(is_dir: bool, perms: FilePermissions) -> Self {
        let type_bits: u32 = if is_dir { S_IFDIR } else { 0 };
        Self(type_bits | (perms.0 & !IFMT))
    }

    pub const fn is_dir(self) -> bool {
        (self.0 & IFMT) == S_IFDIR
    }

    pub const fn is_file(self) -> bool {
        (self.0 & IFMT) == 0
    }

    /// The low 9 permission bits.
    pub const fn permissions(self) -> FilePermissions {
        FilePermissions(self.0 & !IFMT)
    }
}
