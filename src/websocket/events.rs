//! Outbound real-time events.
//!
//! Every frame pushed to a room has the same flat shape:
//! ```json
//! {
//!     "type": "new-message",
//!     "timestamp": "2026-01-01T10:30:00Z",
//!     "user_id": "uuid",
//!     "conversation_id": "uuid",
//!     "message": { ... }
//! }
//! ```
//! `user_id` is the actor that caused the event.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::ConnectionRegistry;
use crate::models::{HydratedMessage, ReactionOutcome, Reactions};

/// Serialized untagged; the event name is injected by
/// [`WebSocketEvent::to_payload_value`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WebSocketEvent {
    NewMessage {
        message: HydratedMessage,
    },

    MessageEdited {
        message: HydratedMessage,
    },

    MessageDeleted {
        message_id: Uuid,
    },

    ChatRead {
        chat_id: Uuid,
        /// Messages newly marked by this read
        marked: u64,
    },

    MessageReactionUpdated {
        message_id: Uuid,
        status: ReactionOutcome,
        reactions: Reactions,
    },

    Typing {
        is_typing: bool,
    },
}

impl WebSocketEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new-message",
            Self::MessageEdited { .. } => "message-edited",
            Self::MessageDeleted { .. } => "message-deleted",
            Self::ChatRead { .. } => "chat-read",
            Self::MessageReactionUpdated { .. } => "message-reaction-updated",
            Self::Typing { .. } => "typing",
        }
    }

    pub fn to_payload_value(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<serde_json::Value, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
            "user_id": user_id,
            "conversation_id": conversation_id,
        });

        // Event fields sit next to the envelope, envelope keys win
        if let serde_json::Value::Object(map) = serde_json::to_value(self)? {
            for (key, value) in map {
                if payload.get(&key).is_none() {
                    payload[key] = value;
                }
            }
        }

        Ok(payload)
    }

    pub fn to_broadcast_payload(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<String, serde_json::Error> {
        let value = self.to_payload_value(conversation_id, user_id)?;
        serde_json::to_string(&value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Failed to serialize event: {0}")]
    Serialization(String),
}

/// Publish an event to the chat's room.
///
/// Returns the number of connections reached; an empty room is not an error.
pub async fn broadcast_event(
    registry: &ConnectionRegistry,
    conversation_id: Uuid,
    user_id: Uuid,
    event: WebSocketEvent,
) -> Result<usize, BroadcastError> {
    let payload = event
        .to_broadcast_payload(conversation_id, user_id)
        .map_err(|e| BroadcastError::Serialization(e.to_string()))?;

    let delivered = registry.publish(conversation_id, payload).await;
    crate::metrics::EVENTS_PUBLISHED_TOTAL
        .with_label_values(&[event.event_type()])
        .inc();

    tracing::debug!(
        chat_id = %conversation_id,
        event = event.event_type(),
        delivered,
        "event published"
    );
    Ok(delivered)
}
