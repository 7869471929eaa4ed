//! Group capability bits.
//!
//! A member's capabilities in a group are a single integer; a capability is
//! held iff every bit of its mask is set.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadMessages,
    WriteMessages,
    /// Implies read and write.
    ManageMessages,
    ChangePermission,
    InviteMember,
    ManageGroup,
    /// Every bit up to and including `ManageGroup`.
    Administrator,
}

impl Permission {
    pub const ALL: [Permission; 7] = [
        Permission::ReadMessages,
        Permission::WriteMessages,
        Permission::ManageMessages,
        Permission::ChangePermission,
        Permission::InviteMember,
        Permission::ManageGroup,
        Permission::Administrator,
    ];

    pub const fn bits(self) -> u32 {
        match self {
            Permission::ReadMessages => 1,
            Permission::WriteMessages => 1 << 1,
            Permission::ManageMessages => (1 << 2) - 1,
            Permission::ChangePermission => 1 << 3,
            Permission::InviteMember => 1 << 4,
            Permission::ManageGroup => 1 << 6,
            Permission::Administrator => (1 << 7) - 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Permission::ReadMessages => "READ_MESSAGES",
            Permission::WriteMessages => "WRITE_MESSAGES",
            Permission::ManageMessages => "MANAGE_MESSAGES",
            Permission::ChangePermission => "CHANGE_PERMISSION",
            Permission::InviteMember => "INVITE_MEMBER",
            Permission::ManageGroup => "MANAGE_GROUP",
            Permission::Administrator => "ADMINISTRATOR",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn has(bits: u32, permission: Permission) -> bool {
    bits & permission.bits() == permission.bits()
}

pub fn grant(bits: u32, permissions: &[Permission]) -> u32 {
    permissions.iter().fold(bits, |acc, p| acc | p.bits())
}

pub fn revoke(bits: u32, permissions: &[Permission]) -> u32 {
    permissions.iter().fold(bits, |acc, p| acc & !p.bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manage_messages_implies_read_and_write() {
        let bits = Permission::ManageMessages.bits();
        assert!(has(bits, Permission::ReadMessages));
        assert!(has(bits, Permission::WriteMessages));
        assert!(!has(Permission::WriteMessages.bits(), Permission::ManageMessages));
    }

    #[test]
    fn test_administrator_holds_everything() {
        let bits = Permission::Administrator.bits();
        for p in Permission::ALL {
            assert!(has(bits, p), "{p} missing from administrator");
        }
    }

    #[test]
    fn test_grant_then_revoke() {
        let bits = grant(0, &[Permission::ReadMessages, Permission::InviteMember]);
        assert_eq!(bits, 0b1_0001);
        let bits = revoke(bits, &[Permission::InviteMember]);
        assert_eq!(bits, 1);
        // Revoking an unheld capability leaves the bits alone.
        assert_eq!(revoke(bits, &[Permission::ManageGroup]), 1);
    }
}
