use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::member::MemberRole;
use crate::permissions::PermissionOverrides;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    #[serde(default)]
    pub broadcast_only_admins: bool,
    #[serde(default)]
    pub slow_mode_seconds: u32,
}

/// Per-member override record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberException {
    pub user_id: Uuid,
    pub overrides: PermissionOverrides,
}

/// Membership and permission authority for group conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub members: BTreeSet<Uuid>,
    pub admins: BTreeSet<Uuid>,
    /// Group-level defaults layered over the built-in defaults
    pub permissions: PermissionOverrides,
    pub exceptions: Vec<MemberException>,
    pub settings: GroupSettings,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(owner_id: Uuid, name: impl Into<String>, members: impl IntoIterator<Item = Uuid>) -> Self {
        let mut members: BTreeSet<Uuid> = members.into_iter().collect();
        members.insert(owner_id);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            members,
            admins: BTreeSet::new(),
            permissions: PermissionOverrides::default(),
            exceptions: Vec::new(),
            settings: GroupSettings::default(),
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    /// Owner counts as admin.
    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.admins.contains(&user_id)
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<MemberRole> {
        if self.owner_id == user_id {
            Some(MemberRole::Owner)
        } else if self.admins.contains(&user_id) {
            Some(MemberRole::Admin)
        } else if self.members.contains(&user_id) {
            Some(MemberRole::Member)
        } else {
            None
        }
    }

    /// First exception record for `user_id`; later duplicates are ignored.
    pub fn exception_for(&self, user_id: Uuid) -> Option<&MemberException> {
        self.exceptions.iter().find(|e| e.user_id == user_id)
    }

    /// Replace the user's exception record, keeping a single entry per user.
    pub fn set_exception(&mut self, user_id: Uuid, overrides: PermissionOverrides) {
        self.exceptions.retain(|e| e.user_id != user_id);
        self.exceptions.push(MemberException { user_id, overrides });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_member_and_admin() {
        let owner = Uuid::new_v4();
        let group = Group::new(owner, "crew", []);
        assert!(group.is_member(owner));
        assert!(group.is_admin(owner));
        assert_eq!(group.role_of(owner), Some(MemberRole::Owner));
    }

    #[test]
    fn test_roles() {
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let member = Uuid::new_v4();
        let mut group = Group::new(owner, "crew", [admin, member]);
        group.admins.insert(admin);

        assert_eq!(group.role_of(admin), Some(MemberRole::Admin));
        assert_eq!(group.role_of(member), Some(MemberRole::Member));
        assert_eq!(group.role_of(Uuid::new_v4()), None);
    }

    #[test]
    fn test_set_exception_replaces_existing() {
        let owner = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut group = Group::new(owner, "crew", [user]);

        group.set_exception(
            user,
            PermissionOverrides {
                can_send_media: Some(false),
                ..Default::default()
            },
        );
        group.set_exception(
            user,
            PermissionOverrides {
                can_embed_links: Some(false),
                ..Default::default()
            },
        );

        assert_eq!(group.exceptions.len(), 1);
        let exception = group.exception_for(user).expect("exception present");
        assert_eq!(exception.overrides.can_send_media, None);
        assert_eq!(exception.overrides.can_embed_links, Some(false));
    }
}
