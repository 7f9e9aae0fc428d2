//! Group membership, roles and permission management.
//!
//! Every mutation goes through [`ChatStore::update_group`], which applies a
//! [`GroupMutation`] against the current stored group.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Group, GroupSettings, MemberRole};
use crate::permissions::{resolve, PermissionOverrides};
use crate::services::audit::{AuditRecord, QueuedAuditSink};
use crate::store::{ChatStore, GroupMutation};

const MAX_GROUP_NAME_LEN: usize = 128;

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("group name is required".into()));
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(AppError::BadRequest("group name is too long".into()));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn ChatStore>,
    audit: QueuedAuditSink,
}

impl GroupService {
    pub fn new(store: Arc<dyn ChatStore>, audit: QueuedAuditSink) -> Self {
        Self { store, audit }
    }

    pub async fn get(&self, actor_id: Uuid, group_id: Uuid) -> AppResult<Group> {
        let group = self.load(group_id).await?;
        if !group.is_member(actor_id) {
            return Err(AppError::Forbidden);
        }
        Ok(group)
    }

    /// The creator becomes owner; duplicate member ids collapse.
    pub async fn create_group(
        &self,
        owner_id: Uuid,
        name: &str,
        member_ids: &[Uuid],
    ) -> AppResult<Group> {
        let name = validate_name(name)?;
        let group = self
            .store
            .insert_group(Group::new(owner_id, name, member_ids.iter().copied()))
            .await?;

        tracing::info!(group_id = %group.id, owner_id = %owner_id, members = group.members.len(), "group created");
        self.audit
            .submit(AuditRecord::new(owner_id, "group_created", "group", group.id));
        Ok(group)
    }

    /// Admins, or members whose effective permissions allow it. Adding an
    /// existing member is a no-op.
    pub async fn add_member(&self, actor_id: Uuid, group_id: Uuid, user_id: Uuid) -> AppResult<Group> {
        let group = self.load(group_id).await?;
        if !group.is_member(actor_id) {
            return Err(AppError::Forbidden);
        }
        if !group.is_admin(actor_id) && !resolve(&group, actor_id).can_add_members {
            return Err(AppError::Forbidden);
        }
        if group.is_member(user_id) {
            return Ok(group);
        }

        let group = self
            .mutate(actor_id, group_id, GroupMutation::AddMember(user_id), "member_added")
            .await?;
        tracing::info!(group_id = %group_id, user_id = %user_id, "member added");
        Ok(group)
    }

    /// Owner only; the target must already be a member.
    pub async fn promote_admin(&self, actor_id: Uuid, group_id: Uuid, user_id: Uuid) -> AppResult<Group> {
        let group = self.load(group_id).await?;
        if group.role_of(actor_id) != Some(MemberRole::Owner) {
            return Err(AppError::Forbidden);
        }
        match group.role_of(user_id) {
            None => return Err(AppError::BadRequest("user is not a member".into())),
            Some(MemberRole::Member) => {}
            Some(_) => return Ok(group),
        }
        self.mutate(actor_id, group_id, GroupMutation::PromoteAdmin(user_id), "admin_promoted")
            .await
    }

    /// Merge new group-level defaults over the existing ones.
    pub async fn update_permissions(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        update: PermissionOverrides,
    ) -> AppResult<Group> {
        self.require_admin(actor_id, group_id).await?;
        self.mutate(
            actor_id,
            group_id,
            GroupMutation::MergePermissions(update),
            "permissions_updated",
        )
        .await
    }

    /// Replace a member's exception record. Admins cannot restrict roles at
    /// or above their own.
    pub async fn set_member_exception(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        user_id: Uuid,
        overrides: PermissionOverrides,
    ) -> AppResult<Group> {
        let group = self.require_admin(actor_id, group_id).await?;
        let target_role = group
            .role_of(user_id)
            .ok_or_else(|| AppError::BadRequest("user is not a member".into()))?;
        let actor_role = group.role_of(actor_id).ok_or(AppError::Forbidden)?;
        if !actor_role.can_manage(target_role) {
            return Err(AppError::Forbidden);
        }
        self.mutate(
            actor_id,
            group_id,
            GroupMutation::SetException { user_id, overrides },
            "member_exception_set",
        )
        .await
    }

    pub async fn update_settings(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        settings: GroupSettings,
    ) -> AppResult<Group> {
        self.require_admin(actor_id, group_id).await?;
        self.mutate(actor_id, group_id, GroupMutation::SetSettings(settings), "settings_updated")
            .await
    }

    pub async fn rename(&self, actor_id: Uuid, group_id: Uuid, name: &str) -> AppResult<Group> {
        let name = validate_name(name)?;
        let group = self.load(group_id).await?;
        if !group.is_member(actor_id) {
            return Err(AppError::Forbidden);
        }
        if !group.is_admin(actor_id) && !resolve(&group, actor_id).can_change_chat_info {
            return Err(AppError::Forbidden);
        }
        self.mutate(actor_id, group_id, GroupMutation::Rename(name), "group_renamed")
            .await
    }

    async fn load(&self, group_id: Uuid) -> AppResult<Group> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn require_admin(&self, actor_id: Uuid, group_id: Uuid) -> AppResult<Group> {
        let group = self.load(group_id).await?;
        if !group.is_admin(actor_id) {
            return Err(AppError::Forbidden);
        }
        Ok(group)
    }

    async fn mutate(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        mutation: GroupMutation,
        action: &str,
    ) -> AppResult<Group> {
        let meta = match &mutation {
            GroupMutation::AddMember(user_id) | GroupMutation::PromoteAdmin(user_id) => {
                serde_json::json!({ "user_id": user_id })
            }
            GroupMutation::Rename(name) => serde_json::json!({ "name": name }),
            GroupMutation::MergePermissions(update) => serde_json::json!({ "permissions": update }),
            GroupMutation::SetException { user_id, overrides } => {
                serde_json::json!({ "user_id": user_id, "overrides": overrides })
            }
            GroupMutation::SetSettings(settings) => serde_json::json!({ "settings": settings }),
        };
        let group = self.store.update_group(group_id, mutation).await?;
        self.audit
            .submit(AuditRecord::new(actor_id, action, "group", group_id).with_meta(meta));
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::audit::TracingAuditSink;
    use crate::store::MemoryStore;

    fn service() -> GroupService {
        let (audit, _) = QueuedAuditSink::spawn(Arc::new(TracingAuditSink), 16);
        GroupService::new(Arc::new(MemoryStore::new()), audit)
    }

    #[tokio::test]
    async fn test_create_group_validates_name() {
        let svc = service();
        let owner = Uuid::new_v4();
        assert!(matches!(
            svc.create_group(owner, "   ", &[]).await,
            Err(AppError::BadRequest(_))
        ));
        let group = svc.create_group(owner, " crew ", &[Uuid::new_v4()]).await.unwrap();
        assert_eq!(group.name, "crew");
        assert_eq!(group.members.len(), 2);
    }

    #[tokio::test]
    async fn test_add_member_respects_permission() {
        let svc = service();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let group = svc.create_group(owner, "g", &[member]).await.unwrap();

        svc.update_permissions(
            owner,
            group.id,
            PermissionOverrides {
                can_add_members: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(
            svc.add_member(member, group.id, Uuid::new_v4()).await.unwrap_err(),
            AppError::Forbidden
        );
        let newcomer = Uuid::new_v4();
        let group = svc.add_member(owner, group.id, newcomer).await.unwrap();
        assert!(group.is_member(newcomer));
    }

    #[tokio::test]
    async fn test_outsider_cannot_add_members() {
        let svc = service();
        let group = svc.create_group(Uuid::new_v4(), "g", &[]).await.unwrap();
        assert_eq!(
            svc.add_member(Uuid::new_v4(), group.id, Uuid::new_v4())
                .await
                .unwrap_err(),
            AppError::Forbidden
        );
    }

    #[tokio::test]
    async fn test_only_owner_promotes() {
        let svc = service();
        let owner = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let group = svc.create_group(owner, "g", &[a, b]).await.unwrap();

        let group = svc.promote_admin(owner, group.id, a).await.unwrap();
        assert!(group.is_admin(a));
        assert_eq!(
            svc.promote_admin(a, group.id, b).await.unwrap_err(),
            AppError::Forbidden
        );
        assert!(matches!(
            svc.promote_admin(owner, group.id, Uuid::new_v4()).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_cannot_restrict_owner_or_peer() {
        let svc = service();
        let owner = Uuid::new_v4();
        let (admin, peer, member) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let group = svc.create_group(owner, "g", &[admin, peer, member]).await.unwrap();
        svc.promote_admin(owner, group.id, admin).await.unwrap();
        svc.promote_admin(owner, group.id, peer).await.unwrap();

        let mute = PermissionOverrides {
            can_send_messages: Some(false),
            ..Default::default()
        };
        for target in [owner, peer] {
            assert_eq!(
                svc.set_member_exception(admin, group.id, target, mute)
                    .await
                    .unwrap_err(),
                AppError::Forbidden
            );
        }

        let group = svc.set_member_exception(admin, group.id, member, mute).await.unwrap();
        assert!(!resolve(&group, member).can_send_messages);
    }

    #[tokio::test]
    async fn test_rename_needs_chat_info_permission() {
        let svc = service();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let group = svc.create_group(owner, "old", &[member]).await.unwrap();

        assert_eq!(
            svc.rename(member, group.id, "new").await.unwrap_err(),
            AppError::Forbidden
        );
        svc.set_member_exception(
            owner,
            group.id,
            member,
            PermissionOverrides {
                can_change_chat_info: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(svc.rename(member, group.id, "new").await.unwrap().name, "new");
    }

    #[tokio::test]
    async fn test_settings_admin_only() {
        let svc = service();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let group = svc.create_group(owner, "g", &[member]).await.unwrap();
        let settings = GroupSettings {
            broadcast_only_admins: true,
            slow_mode_seconds: 30,
        };

        assert_eq!(
            svc.update_settings(member, group.id, settings.clone())
                .await
                .unwrap_err(),
            AppError::Forbidden
        );
        let group = svc.update_settings(owner, group.id, settings).await.unwrap();
        assert_eq!(group.settings.slow_mode_seconds, 30);
    }
}
