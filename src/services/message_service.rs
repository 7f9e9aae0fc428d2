//! Message pipeline: authorize, validate, persist, publish.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    ContentKind, HydratedMessage, MediaCategory, Message, MessageContent, NewMessage,
    SenderProfile,
};
use crate::pagination::{clamp_limit, Cursor, Page};
use crate::permissions;
use crate::services::audit::{AuditRecord, QueuedAuditSink};
use crate::services::conversation_service::{ChatAccess, ConversationService};
use crate::services::read_tracker::redact_read_receipts;
use crate::store::{ChatStore, MessageQuery, SortOrder};
use crate::websocket::events::{broadcast_event, WebSocketEvent};
use crate::websocket::ConnectionRegistry;

static LINK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bhttps?://\S+").expect("Invalid link regex"));

pub fn contains_link(text: &str) -> bool {
    LINK_REGEX.is_match(text)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: MessageContent,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub topic_id: Option<Uuid>,
}

impl SendMessageRequest {
    pub fn new(content: MessageContent) -> Self {
        Self {
            content,
            reply_to: None,
            topic_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMessagesQuery {
    pub topic_id: Option<Uuid>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// Where a send came from, for metrics and logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOrigin {
    Api,
    Socket,
    Forward,
}

impl SendOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Socket => "socket",
            Self::Forward => "forward",
        }
    }
}

/// Shape checks independent of who is sending.
pub fn validate_content(content: &MessageContent, config: &EngineConfig) -> AppResult<()> {
    if content.is_empty() {
        return Err(AppError::BadRequest("message content is empty".into()));
    }
    if let Some(text) = &content.text {
        if text.chars().count() > config.max_text_len {
            return Err(AppError::BadRequest(format!(
                "text exceeds {} characters",
                config.max_text_len
            )));
        }
    }
    if content.kind.is_media() && !content.has_media() {
        return Err(AppError::BadRequest(
            "media content requires a media url".into(),
        ));
    }
    if matches!(content.kind, ContentKind::Text | ContentKind::Poll) && !content.has_text() {
        return Err(AppError::BadRequest("text content requires text".into()));
    }
    Ok(())
}

fn reject(reason: &'static str) -> AppError {
    crate::metrics::record_rejection(reason);
    AppError::Forbidden
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    conversations: ConversationService,
    registry: ConnectionRegistry,
    audit: QueuedAuditSink,
    config: Arc<EngineConfig>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        conversations: ConversationService,
        registry: ConnectionRegistry,
        audit: QueuedAuditSink,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            conversations,
            registry,
            audit,
            config,
        }
    }

    pub async fn send(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        request: SendMessageRequest,
    ) -> AppResult<HydratedMessage> {
        self.send_from(actor_id, chat_id, request, SendOrigin::Api)
            .await
    }

    pub async fn send_from(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        request: SendMessageRequest,
        origin: SendOrigin,
    ) -> AppResult<HydratedMessage> {
        let access = self.conversations.access(actor_id, chat_id).await?;

        if let Some(reply_to) = request.reply_to {
            let parent = self.store.get_message(reply_to).await?;
            if !parent.is_some_and(|p| p.chat_id == chat_id) {
                return Err(AppError::BadRequest(
                    "reply target is not in this chat".into(),
                ));
            }
        }

        let mut new = NewMessage::new(chat_id, actor_id, request.content);
        new.reply_to = request.reply_to;
        new.topic_id = request.topic_id;
        self.deliver(&access, new, origin).await
    }

    /// Authorize and persist an already-built message, then publish it.
    ///
    /// Shared by direct sends, socket sends and forwards so that every path
    /// runs the same checks.
    pub(crate) async fn deliver(
        &self,
        access: &ChatAccess,
        new: NewMessage,
        origin: SendOrigin,
    ) -> AppResult<HydratedMessage> {
        let actor_id = new.sender_id;
        validate_content(&new.content, &self.config)?;
        self.authorize_send(access, actor_id, &new.content, Utc::now())
            .await?;

        let message = self.store.insert_message(new).await?;
        self.store
            .set_last_message(message.chat_id, message.id)
            .await?;

        let hydrated = self.hydrate_one(message).await?;
        if let Err(e) = broadcast_event(
            &self.registry,
            hydrated.message.chat_id,
            actor_id,
            WebSocketEvent::NewMessage {
                message: hydrated.clone(),
            },
        )
        .await
        {
            tracing::warn!(message_id = %hydrated.message.id, error = %e, "failed to publish new-message");
        }

        self.audit.submit(AuditRecord::new(
            actor_id,
            "message_sent",
            "message",
            hydrated.message.id,
        ));
        crate::metrics::MESSAGES_SENT_TOTAL
            .with_label_values(&[origin.as_str()])
            .inc();
        tracing::info!(
            chat_id = %hydrated.message.chat_id,
            message_id = %hydrated.message.id,
            sender_id = %actor_id,
            origin = origin.as_str(),
            "message sent"
        );
        Ok(hydrated)
    }

    /// Group send rules. Private chats only require participation, which
    /// `access` already established.
    async fn authorize_send(
        &self,
        access: &ChatAccess,
        actor_id: Uuid,
        content: &MessageContent,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(group) = &access.group else {
            return Ok(());
        };
        let is_admin = access.is_group_admin(actor_id);
        let perms = permissions::resolve(group, actor_id);

        if group.settings.broadcast_only_admins && !is_admin {
            return Err(reject("broadcast_only_admins"));
        }
        if !perms.can_send_messages && !is_admin {
            return Err(reject("send_messages"));
        }
        if !perms.can_embed_links && content.text.as_deref().is_some_and(contains_link) {
            return Err(reject("embed_links"));
        }
        if content.kind.is_media() {
            if !perms.can_send_media {
                return Err(reject("send_media"));
            }
            match content.media_category() {
                MediaCategory::Photo if !perms.can_send_photos => {
                    return Err(reject("send_photos"))
                }
                MediaCategory::Video if !perms.can_send_videos => {
                    return Err(reject("send_videos"))
                }
                _ => {}
            }
        }
        if content.kind == ContentKind::Poll && !perms.can_send_polls {
            return Err(reject("send_polls"));
        }

        let slow_mode = group.settings.slow_mode_seconds;
        if slow_mode > 0 && !is_admin {
            if let Some(last) = self
                .store
                .last_message_from(access.chat.id, actor_id)
                .await?
            {
                let interval = Duration::seconds(i64::from(slow_mode));
                let elapsed = now - last.created_at;
                if elapsed < interval {
                    let deficit_ms = (interval - elapsed).num_milliseconds().max(0);
                    let retry_after_secs = ((deficit_ms + 999) / 1000).clamp(1, i64::from(slow_mode));
                    crate::metrics::record_rejection("slow_mode");
                    return Err(AppError::RateLimited {
                        retry_after_secs: retry_after_secs as u64,
                    });
                }
            }
        }
        Ok(())
    }

    pub async fn edit(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        message_id: Uuid,
        text: String,
    ) -> AppResult<HydratedMessage> {
        let access = self.conversations.access(actor_id, chat_id).await?;
        let message = self.own_live_message(actor_id, chat_id, message_id).await?;

        let mut updated = message.content.clone();
        updated.text = Some(text.clone());
        validate_content(&updated, &self.config)?;
        if let Some(group) = &access.group {
            if !permissions::resolve(group, actor_id).can_embed_links && contains_link(&text) {
                return Err(reject("embed_links"));
            }
        }

        let edited = self.store.edit_message(message_id, text, Utc::now()).await?;
        let hydrated = self.hydrate_one(edited).await?;

        if let Err(e) = broadcast_event(
            &self.registry,
            chat_id,
            actor_id,
            WebSocketEvent::MessageEdited {
                message: hydrated.clone(),
            },
        )
        .await
        {
            tracing::warn!(message_id = %message_id, error = %e, "failed to publish message-edited");
        }
        self.audit
            .submit(AuditRecord::new(actor_id, "message_edited", "message", message_id));
        Ok(hydrated)
    }

    pub async fn delete(&self, actor_id: Uuid, chat_id: Uuid, message_id: Uuid) -> AppResult<()> {
        self.conversations.access(actor_id, chat_id).await?;
        self.own_live_message(actor_id, chat_id, message_id).await?;

        self.store.tombstone_message(message_id).await?;

        if let Err(e) = broadcast_event(
            &self.registry,
            chat_id,
            actor_id,
            WebSocketEvent::MessageDeleted { message_id },
        )
        .await
        {
            tracing::warn!(message_id = %message_id, error = %e, "failed to publish message-deleted");
        }
        self.audit
            .submit(AuditRecord::new(actor_id, "message_deleted", "message", message_id));
        tracing::info!(chat_id = %chat_id, message_id = %message_id, "message deleted");
        Ok(())
    }

    /// Newest first, paged by an opaque cursor.
    pub async fn list(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        query: ListMessagesQuery,
    ) -> AppResult<Page<HydratedMessage>> {
        let access = self.conversations.access(actor_id, chat_id).await?;
        let limit = clamp_limit(
            query.limit,
            self.config.default_page_size,
            self.config.max_page_size,
        );
        let before_seq = query
            .cursor
            .as_deref()
            .map(Cursor::decode)
            .transpose()?
            .map(|c| c.before_seq());

        // One extra row tells whether another page exists
        let mut items = self
            .store
            .list_messages(&MessageQuery {
                chat_id,
                topic_id: query.topic_id,
                before_seq,
                limit: Some(limit + 1),
                order: SortOrder::NewestFirst,
            })
            .await?;
        let has_more = items.len() > limit;
        items.truncate(limit);

        let next_cursor = if has_more {
            items.last().map(|m| Cursor::before(m.seq).encode())
        } else {
            None
        };

        Ok(Page {
            items: self.shape_for_listing(&access, items).await?,
            next_cursor,
        })
    }

    /// Entire history, oldest first.
    pub async fn list_all(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        topic_id: Option<Uuid>,
    ) -> AppResult<Vec<HydratedMessage>> {
        let access = self.conversations.access(actor_id, chat_id).await?;
        let items = self
            .store
            .list_messages(&MessageQuery {
                chat_id,
                topic_id,
                before_seq: None,
                limit: None,
                order: SortOrder::OldestFirst,
            })
            .await?;
        self.shape_for_listing(&access, items).await
    }

    async fn shape_for_listing(
        &self,
        access: &ChatAccess,
        mut items: Vec<Message>,
    ) -> AppResult<Vec<HydratedMessage>> {
        if let Some(group) = &access.group {
            redact_read_receipts(&mut items, group, &self.config, Utc::now());
        }
        self.hydrate(items).await
    }

    async fn own_live_message(
        &self,
        actor_id: Uuid,
        chat_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Message> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .filter(|m| m.chat_id == chat_id && !m.is_deleted)
            .ok_or(AppError::NotFound)?;
        if message.sender_id != actor_id {
            return Err(AppError::Forbidden);
        }
        Ok(message)
    }

    pub async fn hydrate_one(&self, message: Message) -> AppResult<HydratedMessage> {
        let sender = self
            .store
            .get_profile(message.sender_id)
            .await?
            .unwrap_or_else(|| SenderProfile::bare(message.sender_id));
        Ok(HydratedMessage { message, sender })
    }

    /// Join sender profiles, one lookup per distinct sender.
    pub async fn hydrate(&self, messages: Vec<Message>) -> AppResult<Vec<HydratedMessage>> {
        let mut profiles: HashMap<Uuid, SenderProfile> = HashMap::new();
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            let sender = match profiles.get(&message.sender_id) {
                Some(p) => p.clone(),
                None => {
                    let p = self
                        .store
                        .get_profile(message.sender_id)
                        .await?
                        .unwrap_or_else(|| SenderProfile::bare(message.sender_id));
                    profiles.insert(message.sender_id, p.clone());
                    p
                }
            };
            out.push(HydratedMessage { message, sender });
        }
        Ok(out)
    }
}
