use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Chat, Group};
use crate::services::audit::{AuditRecord, QueuedAuditSink};
use crate::store::ChatStore;

/// A chat the actor is allowed to see, with its backing group when there is
/// one. Produced only by [`ConversationService::access`].
#[derive(Debug, Clone)]
pub struct ChatAccess {
    pub chat: Chat,
    pub group: Option<Group>,
}

impl ChatAccess {
    pub fn is_group_admin(&self, user_id: Uuid) -> bool {
        self.group.as_ref().is_some_and(|g| g.is_admin(user_id))
    }
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    audit: QueuedAuditSink,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>, audit: QueuedAuditSink) -> Self {
        Self { store, audit }
    }

    /// Create a private chat between the actor and exactly one other user.
    ///
    /// An existing chat for the same pair yields `Conflict` carrying its id.
    pub async fn create_private(&self, actor_id: Uuid, participant_ids: &[Uuid]) -> AppResult<Chat> {
        let mut participants: BTreeSet<Uuid> = participant_ids.iter().copied().collect();
        participants.insert(actor_id);
        if participants.len() != 2 {
            return Err(AppError::BadRequest(
                "a private chat needs exactly one other participant".into(),
            ));
        }
        let other = participants
            .iter()
            .copied()
            .find(|id| *id != actor_id)
            .ok_or_else(|| AppError::BadRequest("missing participant".into()))?;

        if let Some(existing) = self.store.find_private_chat(actor_id, other).await? {
            return Err(AppError::Conflict {
                existing_id: existing.id,
            });
        }

        // A concurrent create surfaces as Conflict from the store's unique key
        let chat = self.store.insert_chat(Chat::new_private(actor_id, other)).await?;

        tracing::info!(chat_id = %chat.id, actor_id = %actor_id, "private chat created");
        self.audit.submit(AuditRecord::new(actor_id, "chat_created", "chat", chat.id));
        Ok(chat)
    }

    /// Bind a chat to an existing group; participants follow group membership.
    pub async fn create_group_chat(&self, actor_id: Uuid, group_id: Uuid) -> AppResult<Chat> {
        let group = self
            .store
            .get_group(group_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !group.is_member(actor_id) {
            return Err(AppError::Forbidden);
        }

        if let Some(existing) = self.store.find_group_chat(group_id).await? {
            return Err(AppError::Conflict {
                existing_id: existing.id,
            });
        }

        let chat = self
            .store
            .insert_chat(Chat::new_group(group.id, group.members.clone()))
            .await?;

        tracing::info!(chat_id = %chat.id, group_id = %group_id, "group chat created");
        self.audit.submit(
            AuditRecord::new(actor_id, "chat_created", "chat", chat.id)
                .with_meta(serde_json::json!({ "group_id": group_id })),
        );
        Ok(chat)
    }

    pub async fn set_chat_flags(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        pinned: Option<bool>,
        muted: Option<bool>,
    ) -> AppResult<Chat> {
        self.access(actor_id, chat_id).await?;
        if pinned.is_none() && muted.is_none() {
            return Err(AppError::BadRequest("no settings to change".into()));
        }
        Ok(self.store.set_chat_flags(chat_id, pinned, muted).await?)
    }

    /// Load a chat for `actor_id`, failing `NotFound` when it does not exist
    /// and `Forbidden` when the actor is not a participant.
    ///
    /// Group-backed chats check live group membership.
    pub async fn access(&self, actor_id: Uuid, chat_id: Uuid) -> AppResult<ChatAccess> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let group = match chat.group_id {
            Some(group_id) => Some(
                self.store
                    .get_group(group_id)
                    .await?
                    .ok_or(AppError::NotFound)?,
            ),
            None => None,
        };

        let participant = match &group {
            Some(group) => group.is_member(actor_id),
            None => chat.participants.contains(&actor_id),
        };
        if !participant {
            return Err(AppError::Forbidden);
        }

        Ok(ChatAccess { chat, group })
    }

    /// Participation check that folds "absent" and "not allowed" together,
    /// for callers that must not reveal whether a chat exists.
    pub async fn is_participant(&self, actor_id: Uuid, chat_id: Uuid) -> AppResult<bool> {
        match self.access(actor_id, chat_id).await {
            Ok(_) => Ok(true),
            Err(AppError::NotFound | AppError::Forbidden) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
