use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageContent;

/// Inbound WebSocket events from client to server
///
/// The sender is always the identity bound at handshake; frames never carry
/// a user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    Join {
        chat_id: Uuid,
    },
    Leave {
        chat_id: Uuid,
    },
    SendMessage {
        chat_id: Uuid,
        content: MessageContent,
        #[serde(default)]
        reply_to: Option<Uuid>,
        #[serde(default)]
        topic_id: Option<Uuid>,
        /// Echoed back in the ack so clients can de-duplicate
        #[serde(default)]
        client_ref: Option<String>,
    },
    MarkRead {
        chat_id: Uuid,
    },
    Typing {
        chat_id: Uuid,
        #[serde(default = "default_true")]
        is_typing: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Direct replies to the originating connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsReply {
    Joined {
        chat_id: Uuid,
    },
    Left {
        chat_id: Uuid,
    },
    Sent {
        message_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;

    #[test]
    fn test_parse_send_message() {
        let chat = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"send_message","chat_id":"{chat}","content":{{"kind":"text","text":"hi"}}}}"#
        );
        match serde_json::from_str::<WsInboundEvent>(&raw).unwrap() {
            WsInboundEvent::SendMessage {
                chat_id, content, ..
            } => {
                assert_eq!(chat_id, chat);
                assert_eq!(content.kind, ContentKind::Text);
                assert_eq!(content.text.as_deref(), Some("hi"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_typing_defaults_to_started() {
        let raw = format!(r#"{{"type":"typing","chat_id":"{}"}}"#, Uuid::new_v4());
        assert!(matches!(
            serde_json::from_str::<WsInboundEvent>(&raw).unwrap(),
            WsInboundEvent::Typing {
                is_typing: true,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<WsInboundEvent>(r#"{"type":"get_unacked"}"#).is_err());
    }
}
