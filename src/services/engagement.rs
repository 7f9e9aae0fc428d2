//! Reaction, view and forward engine.
//!
//! The `apply_*` primitives work on any entity through the capability
//! traits; stores call them while holding whatever makes the mutation
//! atomic. [`EngagementService`] adds lookup, authorization and fan-out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    ChannelPost, EntityKind, EntityRef, ForwardInfo, ForwardOrigin, ForwardStats, ForwardTarget,
    ForwardTargetKind, Forwardable, HydratedMessage, Message, NewMessage, Reactable,
    ReactionOutcome, Reactions, Story, ViewOutcome, Viewable,
};
use crate::services::audit::{AuditRecord, QueuedAuditSink};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::{validate_content, MessageService, SendOrigin};
use crate::store::ChatStore;
use crate::websocket::events::{broadcast_event, WebSocketEvent};
use crate::websocket::ConnectionRegistry;

// ============================================================================
// Primitives
// ============================================================================

/// Toggle the user's single reaction slot and return the new summary.
pub fn apply_reaction<E: Reactable + ?Sized>(
    entity: &mut E,
    user_id: Uuid,
    emoji: &str,
) -> (ReactionOutcome, Reactions) {
    let outcome = entity.reactions_mut().toggle(user_id, emoji);
    (outcome, entity.reactions().clone())
}

pub fn apply_view<E: Viewable + ?Sized>(
    entity: &mut E,
    viewer_id: Uuid,
    at: DateTime<Utc>,
) -> ViewOutcome {
    if !entity.viewers_mut().insert(viewer_id, at) {
        return ViewOutcome::AlreadyCounted;
    }
    if let Some(counter) = entity.view_counter_mut() {
        *counter += 1;
    }
    ViewOutcome::Counted
}

pub fn apply_forward<E: Forwardable + ?Sized>(
    entity: &mut E,
    target: ForwardTarget,
    at: DateTime<Utc>,
) -> ForwardStats {
    entity.forward_stats_mut().record(target, at);
    entity.forward_stats().clone()
}

/// Provenance for a copy of `entity`; empty content cannot be forwarded.
pub fn forward_snapshot<E: Forwardable + ?Sized>(
    entity: &E,
    forwarded_by: Uuid,
    at: DateTime<Utc>,
) -> AppResult<ForwardInfo> {
    let content = entity.forwardable_content();
    if content.is_empty() {
        return Err(AppError::BadRequest("nothing to forward".into()));
    }
    let source = entity.entity_ref();
    Ok(ForwardInfo {
        forwarded_by,
        forwarded_at: at,
        original: ForwardOrigin {
            kind: source.kind,
            id: source.id,
            author_id: entity.author_id(),
        },
        snapshot: content.clone(),
    })
}

/// Parse a destination from loosely typed input.
pub fn parse_destination(kind: Option<&str>, id: Option<&str>) -> AppResult<ForwardTarget> {
    let malformed = |what: &str| AppError::BadRequest(format!("malformed destination: {what}"));
    let kind = match kind.map(str::trim) {
        Some("chat") => ForwardTargetKind::Chat,
        Some("group") => ForwardTargetKind::Group,
        Some("channel") => ForwardTargetKind::Channel,
        Some(other) => return Err(malformed(&format!("unknown type {other}"))),
        None => return Err(malformed("missing type")),
    };
    let id = id
        .ok_or_else(|| malformed("missing id"))?
        .parse::<Uuid>()
        .map_err(|_| malformed("id is not a uuid"))?;
    Ok(ForwardTarget { kind, id })
}

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReactionResult {
    pub status: ReactionOutcome,
    pub reactions: Reactions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardedEntity {
    Message(HydratedMessage),
    ChannelPost(ChannelPost),
}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardResult {
    pub entity: ForwardedEntity,
    pub source_stats: ForwardStats,
}

/// A source entity the actor may see.
enum Source {
    Message(Message),
    Post(ChannelPost),
    Story(Story),
}

impl Source {
    fn as_forwardable(&self) -> &dyn Forwardable {
        match self {
            Source::Message(m) => m,
            Source::Post(p) => p,
            Source::Story(s) => s,
        }
    }
}

#[derive(Clone)]
pub struct EngagementService {
    store: Arc<dyn ChatStore>,
    conversations: ConversationService,
    messages: MessageService,
    registry: ConnectionRegistry,
    audit: QueuedAuditSink,
    config: Arc<EngineConfig>,
}

impl EngagementService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        conversations: ConversationService,
        messages: MessageService,
        registry: ConnectionRegistry,
        audit: QueuedAuditSink,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            conversations,
            messages,
            registry,
            audit,
            config,
        }
    }

    async fn load_source(&self, entity: EntityRef, actor_id: Uuid) -> AppResult<Source> {
        match entity.kind {
            EntityKind::Message => {
                let message = self
                    .store
                    .get_message(entity.id)
                    .await?
                    .filter(|m| !m.is_deleted)
                    .ok_or(AppError::NotFound)?;
                self.conversations.access(actor_id, message.chat_id).await?;
                Ok(Source::Message(message))
            }
            EntityKind::ChannelPost => {
                let post = self
                    .store
                    .get_post(entity.id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                Ok(Source::Post(post))
            }
            EntityKind::Story => {
                let story = self
                    .store
                    .get_story(entity.id)
                    .await?
                    .filter(|s| !s.is_expired(Utc::now()))
                    .ok_or(AppError::NotFound)?;
                Ok(Source::Story(story))
            }
        }
    }

    fn validate_emoji<'a>(&self, emoji: &'a str) -> AppResult<&'a str> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().any(char::is_whitespace) {
            return Err(AppError::BadRequest("emoji is required".into()));
        }
        if emoji.chars().count() > self.config.max_emoji_len {
            return Err(AppError::BadRequest("emoji is too long".into()));
        }
        Ok(emoji)
    }

    /// Toggle the actor's reaction on any reaction-bearing entity.
    pub async fn react(
        &self,
        entity: EntityRef,
        actor_id: Uuid,
        emoji: &str,
    ) -> AppResult<ReactionResult> {
        let emoji = self.validate_emoji(emoji)?;
        let source = self.load_source(entity, actor_id).await?;

        let (status, reactions) = self.store.react(entity, actor_id, emoji).await?;
        crate::metrics::REACTIONS_TOTAL
            .with_label_values(&[
                entity.kind.to_db(),
                match status {
                    ReactionOutcome::Removed => "removed",
                    ReactionOutcome::Updated => "updated",
                },
            ])
            .inc();

        if let Source::Message(message) = &source {
            if let Err(e) = broadcast_event(
                &self.registry,
                message.chat_id,
                actor_id,
                WebSocketEvent::MessageReactionUpdated {
                    message_id: message.id,
                    status,
                    reactions: reactions.clone(),
                },
            )
            .await
            {
                tracing::warn!(message_id = %message.id, error = %e, "failed to publish reaction update");
            }
        }

        tracing::debug!(
            entity_kind = entity.kind.to_db(),
            entity_id = %entity.id,
            user_id = %actor_id,
            ?status,
            "reaction toggled"
        );
        Ok(ReactionResult { status, reactions })
    }

    /// Count a view once per viewer. Messages do not track views.
    pub async fn add_view(&self, entity: EntityRef, actor_id: Uuid) -> AppResult<ViewOutcome> {
        if entity.kind == EntityKind::Message {
            return Err(AppError::BadRequest("messages do not track views".into()));
        }
        self.load_source(entity, actor_id).await?;
        Ok(self.store.add_view(entity, actor_id, Utc::now()).await?)
    }

    /// Copy an entity into a chat, group chat or channel with provenance,
    /// then bump the source's forward counter.
    pub async fn forward(
        &self,
        entity: EntityRef,
        actor_id: Uuid,
        destination: ForwardTarget,
    ) -> AppResult<ForwardResult> {
        let source = self.load_source(entity, actor_id).await?;
        let now = Utc::now();
        let info = forward_snapshot(source.as_forwardable(), actor_id, now)?;

        let created = match destination.kind {
            ForwardTargetKind::Chat | ForwardTargetKind::Group => {
                let chat_id = match destination.kind {
                    ForwardTargetKind::Group => {
                        self.store
                            .find_group_chat(destination.id)
                            .await?
                            .ok_or(AppError::NotFound)?
                            .id
                    }
                    _ => destination.id,
                };
                let access = self.conversations.access(actor_id, chat_id).await?;
                let mut new = NewMessage::new(chat_id, actor_id, info.snapshot.clone());
                new.forward = Some(info);
                let message = self
                    .messages
                    .deliver(&access, new, SendOrigin::Forward)
                    .await?;
                ForwardedEntity::Message(message)
            }
            ForwardTargetKind::Channel => {
                let channel = self
                    .store
                    .get_channel(destination.id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                if !channel.can_publish(actor_id) {
                    return Err(AppError::Forbidden);
                }
                validate_content(&info.snapshot, &self.config)?;
                let mut post = ChannelPost::new(channel.id, actor_id, info.snapshot.clone());
                post.forward = Some(info);
                ForwardedEntity::ChannelPost(self.store.insert_post(post).await?)
            }
        };

        let source_stats = self.store.record_forward(entity, destination, now).await?;

        self.audit.submit(
            AuditRecord::new(actor_id, "entity_forwarded", entity.kind.to_db(), entity.id)
                .with_meta(serde_json::json!({
                    "destination": destination,
                    "forward_count": source_stats.count,
                })),
        );
        tracing::info!(
            entity_kind = entity.kind.to_db(),
            entity_id = %entity.id,
            destination_id = %destination.id,
            "entity forwarded"
        );
        Ok(ForwardResult {
            entity: created,
            source_stats,
        })
    }
}
