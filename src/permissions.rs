//! Effective permission resolution for group members.
//!
//! Layers, lowest first: built-in defaults, the group's configured defaults,
//! then the single exception record matching the user. Resolution is pure and
//! runs on every authorization check; results are never cached.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Group;

/// Fully resolved capability map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub can_send_messages: bool,
    pub can_send_media: bool,
    pub can_send_photos: bool,
    pub can_send_videos: bool,
    pub can_send_polls: bool,
    pub can_embed_links: bool,
    pub can_pin_messages: bool,
    pub can_add_members: bool,
    pub can_change_chat_info: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            can_send_messages: true,
            can_send_media: true,
            can_send_photos: true,
            can_send_videos: true,
            can_send_polls: true,
            can_embed_links: true,
            can_pin_messages: true,
            can_add_members: true,
            can_change_chat_info: false,
        }
    }
}

/// Partial capability map; `None` leaves the lower layer in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_media: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_photos: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_videos: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_send_polls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_embed_links: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_pin_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_add_members: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_change_chat_info: Option<bool>,
}

impl PermissionOverrides {
    /// Field-wise merge, `other` wins where set.
    pub fn merged_with(self, other: PermissionOverrides) -> Self {
        Self {
            can_send_messages: other.can_send_messages.or(self.can_send_messages),
            can_send_media: other.can_send_media.or(self.can_send_media),
            can_send_photos: other.can_send_photos.or(self.can_send_photos),
            can_send_videos: other.can_send_videos.or(self.can_send_videos),
            can_send_polls: other.can_send_polls.or(self.can_send_polls),
            can_embed_links: other.can_embed_links.or(self.can_embed_links),
            can_pin_messages: other.can_pin_messages.or(self.can_pin_messages),
            can_add_members: other.can_add_members.or(self.can_add_members),
            can_change_chat_info: other.can_change_chat_info.or(self.can_change_chat_info),
        }
    }
}

impl Permissions {
    pub fn overlay(mut self, layer: &PermissionOverrides) -> Self {
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $( if let Some(v) = layer.$field { self.$field = v; } )*
            };
        }
        apply!(
            can_send_messages,
            can_send_media,
            can_send_photos,
            can_send_videos,
            can_send_polls,
            can_embed_links,
            can_pin_messages,
            can_add_members,
            can_change_chat_info,
        );
        self
    }
}

/// Effective permissions of `user_id` in `group`.
pub fn resolve(group: &Group, user_id: Uuid) -> Permissions {
    let base = Permissions::default().overlay(&group.permissions);
    match group.exception_for(user_id) {
        Some(exception) => base.overlay(&exception.overrides),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberException;

    #[test]
    fn test_builtin_defaults() {
        let p = Permissions::default();
        assert!(p.can_send_messages);
        assert!(p.can_send_media);
        assert!(p.can_add_members);
        assert!(p.can_pin_messages);
        assert!(!p.can_change_chat_info);
    }

    #[test]
    fn test_group_defaults_overlay_builtin() {
        let owner = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut group = Group::new(owner, "g", [user]);
        group.permissions.can_embed_links = Some(false);
        group.permissions.can_change_chat_info = Some(true);

        let p = resolve(&group, user);
        assert!(!p.can_embed_links);
        assert!(p.can_change_chat_info);
        assert!(p.can_send_messages);
    }

    #[test]
    fn test_exception_overrides_group_defaults() {
        let owner = Uuid::new_v4();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut group = Group::new(owner, "g", [user, other]);
        group.permissions.can_send_media = Some(false);
        group.set_exception(
            user,
            PermissionOverrides {
                can_send_media: Some(true),
                can_send_messages: Some(false),
                ..Default::default()
            },
        );

        let p = resolve(&group, user);
        assert!(p.can_send_media);
        assert!(!p.can_send_messages);

        let q = resolve(&group, other);
        assert!(!q.can_send_media);
        assert!(q.can_send_messages);
    }

    #[test]
    fn test_only_first_exception_applies() {
        let owner = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut group = Group::new(owner, "g", [user]);
        group.exceptions.push(MemberException {
            user_id: user,
            overrides: PermissionOverrides {
                can_send_videos: Some(false),
                ..Default::default()
            },
        });
        group.exceptions.push(MemberException {
            user_id: user,
            overrides: PermissionOverrides {
                can_send_photos: Some(false),
                ..Default::default()
            },
        });

        let p = resolve(&group, user);
        assert!(!p.can_send_videos);
        assert!(p.can_send_photos);
    }

    #[test]
    fn test_merged_with_prefers_newer_fields() {
        let base = PermissionOverrides {
            can_send_media: Some(false),
            can_embed_links: Some(false),
            ..Default::default()
        };
        let update = PermissionOverrides {
            can_embed_links: Some(true),
            ..Default::default()
        };
        let merged = base.merged_with(update);
        assert_eq!(merged.can_send_media, Some(false));
        assert_eq!(merged.can_embed_links, Some(true));
    }
}
