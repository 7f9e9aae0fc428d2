use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::AppResult;
use crate::models::{Group, Message};
use crate::services::conversation_service::ConversationService;
use crate::store::ChatStore;
use crate::websocket::events::{broadcast_event, WebSocketEvent};
use crate::websocket::ConnectionRegistry;

/// Collapse `read_by` to the sender for large groups and old messages.
///
/// Operates on the returned copies only; stored read sets are untouched.
pub fn redact_read_receipts(
    messages: &mut [Message],
    group: &Group,
    config: &EngineConfig,
    now: DateTime<Utc>,
) {
    let large_group = group.members.len() >= config.redaction_member_threshold;
    for message in messages {
        if large_group || now - message.created_at > config.redaction_max_age {
            message.read_by = [message.sender_id].into_iter().collect();
        }
    }
}

#[derive(Clone)]
pub struct ReadTracker {
    store: Arc<dyn ChatStore>,
    conversations: ConversationService,
    registry: ConnectionRegistry,
}

impl ReadTracker {
    pub fn new(
        store: Arc<dyn ChatStore>,
        conversations: ConversationService,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            store,
            conversations,
            registry,
        }
    }

    /// Add the actor to `read_by` of every live message in the chat.
    ///
    /// Idempotent; returns how many messages changed.
    pub async fn mark_read(&self, actor_id: Uuid, chat_id: Uuid) -> AppResult<u64> {
        self.conversations.access(actor_id, chat_id).await?;
        let marked = self.store.mark_read(chat_id, actor_id).await?;

        if let Err(e) = broadcast_event(
            &self.registry,
            chat_id,
            actor_id,
            WebSocketEvent::ChatRead { chat_id, marked },
        )
        .await
        {
            tracing::warn!(chat_id = %chat_id, error = %e, "failed to publish chat-read");
        }

        tracing::debug!(chat_id = %chat_id, user_id = %actor_id, marked, "chat marked read");
        Ok(marked)
    }

    pub async fn unread_count(&self, actor_id: Uuid, chat_id: Uuid) -> AppResult<u64> {
        self.conversations.access(actor_id, chat_id).await?;
        Ok(self.store.count_unread(chat_id, actor_id).await?)
    }
}
