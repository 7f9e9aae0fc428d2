//! Inbound socket frames, independent of the transport actor.
//!
//! Every frame is handled as the identity bound at handshake. Sends go
//! through the same service path as the HTTP API.

use uuid::Uuid;

use super::message_types::{WsInboundEvent, WsReply};
use super::ConnectionId;
use crate::error::AppError;
use crate::services::message_service::{SendMessageRequest, SendOrigin};
use crate::state::AppState;
use crate::websocket::events::{broadcast_event, WebSocketEvent};

/// Subscribe the connection to a chat room after re-checking participation.
///
/// Unknown chats and chats the user is not in look the same: nothing
/// happens and `false` is returned.
pub async fn join_room(state: &AppState, conn: ConnectionId, user_id: Uuid, chat_id: Uuid) -> bool {
    match state.conversations.is_participant(user_id, chat_id).await {
        Ok(true) => state.registry.join(conn, chat_id).await,
        Ok(false) => {
            tracing::debug!(connection = %conn, user_id = %user_id, chat_id = %chat_id, "join refused");
            false
        }
        Err(e) => {
            tracing::warn!(connection = %conn, chat_id = %chat_id, error = %e, "join check failed");
            false
        }
    }
}

pub fn error_reply(err: &AppError, client_ref: Option<String>) -> WsReply {
    WsReply::Error {
        code: err.code().to_string(),
        message: err.public_message(),
        retry_after: match err {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        },
        client_ref,
    }
}

/// Dispatch one parsed frame. Returns the direct reply, if any.
pub async fn handle_inbound(
    state: &AppState,
    conn: ConnectionId,
    user_id: Uuid,
    event: WsInboundEvent,
) -> Option<WsReply> {
    match event {
        WsInboundEvent::Join { chat_id } => join_room(state, conn, user_id, chat_id)
            .await
            .then_some(WsReply::Joined { chat_id }),

        WsInboundEvent::Leave { chat_id } => {
            state.registry.leave(conn, chat_id).await;
            Some(WsReply::Left { chat_id })
        }

        WsInboundEvent::SendMessage {
            chat_id,
            content,
            reply_to,
            topic_id,
            client_ref,
        } => {
            let request = SendMessageRequest {
                content,
                reply_to,
                topic_id,
            };
            match state
                .messages
                .send_from(user_id, chat_id, request, SendOrigin::Socket)
                .await
            {
                Ok(sent) => Some(WsReply::Sent {
                    message_id: sent.message.id,
                    client_ref,
                }),
                Err(e) => Some(error_reply(&e, client_ref)),
            }
        }

        WsInboundEvent::MarkRead { chat_id } => match state.reads.mark_read(user_id, chat_id).await {
            Ok(_) => None,
            Err(e) => Some(error_reply(&e, None)),
        },

        WsInboundEvent::Typing { chat_id, is_typing } => {
            // Only rooms this connection was admitted to
            if !state.registry.is_subscribed(conn, chat_id).await {
                return None;
            }
            if let Err(e) = broadcast_event(
                &state.registry,
                chat_id,
                user_id,
                WebSocketEvent::Typing { is_typing },
            )
            .await
            {
                tracing::warn!(chat_id = %chat_id, error = %e, "failed to publish typing");
            }
            None
        }
    }
}

/// Parse a text frame, dispatch it, and serialize the reply.
pub async fn handle_text(
    state: &AppState,
    conn: ConnectionId,
    user_id: Uuid,
    text: &str,
) -> Option<String> {
    let reply = match serde_json::from_str::<WsInboundEvent>(text) {
        Ok(event) => handle_inbound(state, conn, user_id, event).await,
        Err(e) => {
            tracing::debug!(connection = %conn, error = %e, "unparseable frame");
            Some(error_reply(
                &AppError::BadRequest(format!("invalid frame: {e}")),
                None,
            ))
        }
    }?;

    match serde_json::to_string(&reply) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::MessageContent;

    async fn setup() -> (AppState, Uuid, Uuid, Uuid) {
        let state = AppState::in_memory(EngineConfig::default());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let chat = state.conversations.create_private(a, &[b]).await.unwrap();
        (state, a, b, chat.id)
    }

    #[tokio::test]
    async fn test_join_requires_participation() {
        let (state, a, _, chat_id) = setup().await;
        let (member_conn, _rx1) = state.registry.register(a).await;
        let (outsider_conn, _rx2) = state.registry.register(Uuid::new_v4()).await;

        assert!(join_room(&state, member_conn, a, chat_id).await);
        assert!(!join_room(&state, outsider_conn, Uuid::new_v4(), chat_id).await);
        assert!(!join_room(&state, member_conn, a, Uuid::new_v4()).await);
        assert_eq!(state.registry.subscriber_count(chat_id).await, 1);
    }

    #[tokio::test]
    async fn test_refused_join_is_silent() {
        let (state, _, _, chat_id) = setup().await;
        let outsider = Uuid::new_v4();
        let (conn, _rx) = state.registry.register(outsider).await;

        let reply = handle_inbound(&state, conn, outsider, WsInboundEvent::Join { chat_id }).await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_socket_send_reaches_room() {
        let (state, a, b, chat_id) = setup().await;
        let (conn_a, _rx_a) = state.registry.register(a).await;
        let (conn_b, mut rx_b) = state.registry.register(b).await;
        join_room(&state, conn_b, b, chat_id).await;

        let reply = handle_inbound(
            &state,
            conn_a,
            a,
            WsInboundEvent::SendMessage {
                chat_id,
                content: MessageContent::text("over the socket"),
                reply_to: None,
                topic_id: None,
                client_ref: Some("c1".into()),
            },
        )
        .await;
        assert!(matches!(reply, Some(WsReply::Sent { client_ref: Some(ref r), .. }) if r == "c1"));

        let frame: serde_json::Value = serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "new-message");
        assert_eq!(frame["message"]["content"]["text"], "over the socket");
    }

    #[tokio::test]
    async fn test_socket_send_is_authorized() {
        let (state, _, _, chat_id) = setup().await;
        let outsider = Uuid::new_v4();
        let (conn, _rx) = state.registry.register(outsider).await;

        let reply = handle_text(
            &state,
            conn,
            outsider,
            &format!(
                r#"{{"type":"send_message","chat_id":"{chat_id}","content":{{"kind":"text","text":"hi"}}}}"#
            ),
        )
        .await
        .unwrap();
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "forbidden");
    }

    #[tokio::test]
    async fn test_typing_only_in_joined_rooms() {
        let (state, a, b, chat_id) = setup().await;
        let (conn_a, _rx_a) = state.registry.register(a).await;
        let (conn_b, mut rx_b) = state.registry.register(b).await;
        join_room(&state, conn_b, b, chat_id).await;

        // Not joined yet: dropped
        handle_inbound(&state, conn_a, a, WsInboundEvent::Typing { chat_id, is_typing: true }).await;
        assert!(rx_b.try_recv().is_err());

        join_room(&state, conn_a, a, chat_id).await;
        handle_inbound(&state, conn_a, a, WsInboundEvent::Typing { chat_id, is_typing: true }).await;
        let frame: serde_json::Value = serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "typing");
        assert_eq!(frame["user_id"], a.to_string());
    }

    #[tokio::test]
    async fn test_garbage_frame_gets_bad_request() {
        let (state, a, _, _) = setup().await;
        let (conn, _rx) = state.registry.register(a).await;
        let reply = handle_text(&state, conn, a, "{not json").await.unwrap();
        assert!(reply.contains("bad_request"));
    }
}
