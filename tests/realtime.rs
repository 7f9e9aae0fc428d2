// Room fan-out: what subscribed connections receive as chats change.

use messaging_engine::{
    config::EngineConfig,
    models::{EntityRef, MessageContent, SenderProfile},
    services::message_service::{ListMessagesQuery, SendMessageRequest},
    state::AppState,
    websocket::{
        handlers::{handle_inbound, handle_text},
        message_types::{WsInboundEvent, WsReply},
    },
};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

fn next_frame(rx: &mut UnboundedReceiver<String>) -> Value {
    let raw = rx.try_recv().expect("expected a frame");
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_room_receives_chat_lifecycle_events() {
    let state = AppState::in_memory(EngineConfig::default());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let chat = state.conversations.create_private(a, &[b]).await.unwrap();

    let (conn, mut rx) = state.registry.register(b).await;
    let joined = handle_inbound(&state, conn, b, WsInboundEvent::Join { chat_id: chat.id }).await;
    assert!(matches!(joined, Some(WsReply::Joined { chat_id }) if chat_id == chat.id));

    let sent = state
        .messages
        .send(a, chat.id, SendMessageRequest::new(MessageContent::text("hi")))
        .await
        .unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["type"], "new-message");
    assert_eq!(frame["conversation_id"], chat.id.to_string());
    assert_eq!(frame["user_id"], a.to_string());
    assert_eq!(frame["message"]["id"], sent.message.id.to_string());
    assert!(frame["timestamp"].is_string());

    state
        .engagement
        .react(EntityRef::message(sent.message.id), b, "👍")
        .await
        .unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["type"], "message-reaction-updated");
    assert_eq!(frame["status"], "updated");

    state
        .messages
        .edit(a, chat.id, sent.message.id, "hi there".into())
        .await
        .unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["type"], "message-edited");
    assert_eq!(frame["message"]["content"]["text"], "hi there");

    state.reads.mark_read(b, chat.id).await.unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["type"], "chat-read");
    assert_eq!(frame["marked"], 1);

    state.messages.delete(a, chat.id, sent.message.id).await.unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["type"], "message-deleted");
    assert_eq!(frame["message_id"], sent.message.id.to_string());

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_sender_profile_is_joined_into_frames_and_listings() {
    let state = AppState::in_memory(EngineConfig::default());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .store
        .upsert_profile(SenderProfile {
            id: a,
            display_name: Some("Ada".into()),
            avatar_url: Some("https://cdn.example/ada.png".into()),
        })
        .await
        .unwrap();
    let chat = state.conversations.create_private(a, &[b]).await.unwrap();

    let (conn, mut rx) = state.registry.register(b).await;
    handle_inbound(&state, conn, b, WsInboundEvent::Join { chat_id: chat.id }).await;

    state
        .messages
        .send(a, chat.id, SendMessageRequest::new(MessageContent::text("hi")))
        .await
        .unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["message"]["sender"]["display_name"], "Ada");
    assert_eq!(
        frame["message"]["sender"]["avatar_url"],
        "https://cdn.example/ada.png"
    );

    let page = state
        .messages
        .list(b, chat.id, ListMessagesQuery::default())
        .await
        .unwrap();
    assert_eq!(page.items[0].sender.display_name.as_deref(), Some("Ada"));
    assert_eq!(
        page.items[0].sender.avatar_url.as_deref(),
        Some("https://cdn.example/ada.png")
    );

    // Senders without a profile fall back to the bare id
    state
        .messages
        .send(b, chat.id, SendMessageRequest::new(MessageContent::text("yo")))
        .await
        .unwrap();
    let frame = next_frame(&mut rx);
    assert_eq!(frame["message"]["sender"]["id"], b.to_string());
    assert!(frame["message"]["sender"]["display_name"].is_null());
}

#[tokio::test]
async fn test_outsider_cannot_join_room() {
    let state = AppState::in_memory(EngineConfig::default());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let chat = state.conversations.create_private(a, &[b]).await.unwrap();

    let outsider = Uuid::new_v4();
    let (conn, mut rx) = state.registry.register(outsider).await;
    let reply =
        handle_inbound(&state, conn, outsider, WsInboundEvent::Join { chat_id: chat.id }).await;
    assert!(reply.is_none());
    assert!(!state.registry.is_subscribed(conn, chat.id).await);

    state
        .messages
        .send(a, chat.id, SendMessageRequest::new(MessageContent::text("private")))
        .await
        .unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnect_leaves_every_room() {
    let state = AppState::in_memory(EngineConfig::default());
    let a = Uuid::new_v4();
    let chat1 = state
        .conversations
        .create_private(a, &[Uuid::new_v4()])
        .await
        .unwrap();
    let chat2 = state
        .conversations
        .create_private(a, &[Uuid::new_v4()])
        .await
        .unwrap();

    let (conn, _rx) = state.registry.register(a).await;
    for chat in [chat1.id, chat2.id] {
        handle_inbound(&state, conn, a, WsInboundEvent::Join { chat_id: chat }).await;
    }
    assert_eq!(state.registry.subscriber_count(chat1.id).await, 1);

    state.registry.disconnect(conn).await;
    assert_eq!(state.registry.subscriber_count(chat1.id).await, 0);
    assert_eq!(state.registry.subscriber_count(chat2.id).await, 0);
    assert_eq!(state.registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_socket_send_acks_and_fans_out() {
    let state = AppState::in_memory(EngineConfig::default());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let chat = state.conversations.create_private(a, &[b]).await.unwrap();

    let (conn_a, _rx_a) = state.registry.register(a).await;
    let (conn_b, mut rx_b) = state.registry.register(b).await;
    handle_inbound(&state, conn_b, b, WsInboundEvent::Join { chat_id: chat.id }).await;

    let frame = serde_json::json!({
        "type": "send_message",
        "chat_id": chat.id,
        "content": {"kind": "text", "text": "over the socket"},
        "client_ref": "c-42",
    })
    .to_string();
    let reply = handle_text(&state, conn_a, a, &frame).await.unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["type"], "sent");
    assert_eq!(reply["client_ref"], "c-42");

    let pushed = next_frame(&mut rx_b);
    assert_eq!(pushed["type"], "new-message");
    assert_eq!(pushed["message"]["content"]["text"], "over the socket");
}

#[tokio::test]
async fn test_typing_needs_joined_room() {
    let state = AppState::in_memory(EngineConfig::default());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let chat = state.conversations.create_private(a, &[b]).await.unwrap();

    let (conn_a, _rx_a) = state.registry.register(a).await;
    let (conn_b, mut rx_b) = state.registry.register(b).await;
    handle_inbound(&state, conn_b, b, WsInboundEvent::Join { chat_id: chat.id }).await;

    // Not joined yet
    handle_inbound(
        &state,
        conn_a,
        a,
        WsInboundEvent::Typing {
            chat_id: chat.id,
            is_typing: true,
        },
    )
    .await;
    assert!(rx_b.try_recv().is_err());

    handle_inbound(&state, conn_a, a, WsInboundEvent::Join { chat_id: chat.id }).await;
    handle_inbound(
        &state,
        conn_a,
        a,
        WsInboundEvent::Typing {
            chat_id: chat.id,
            is_typing: true,
        },
    )
    .await;
    let frame = next_frame(&mut rx_b);
    assert_eq!(frame["type"], "typing");
    assert_eq!(frame["is_typing"], true);
}
