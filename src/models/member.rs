//! Member role and related data structures
//!
//! Roles have a natural ordering: Member < Admin < Owner

use serde::{Deserialize, Serialize};
use std::fmt;

/// Member role in a group with natural hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Regular member - subject to group permissions and exceptions
    Member = 0,
    /// Admin - bypasses send restrictions, manages permissions and members
    Admin = 1,
    /// Owner - full control, cannot be managed by admins
    Owner = 2,
}

impl MemberRole {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Check if this role can manage another role
    /// Rule: You can only manage roles strictly below yours
    pub fn can_manage(&self, target: MemberRole) -> bool {
        *self > target
    }

    /// Check if this role can perform admin actions
    pub fn is_privileged(&self) -> bool {
        *self >= MemberRole::Admin
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db(s).ok_or_else(|| format!("Invalid role: {}", s))
    }
}
