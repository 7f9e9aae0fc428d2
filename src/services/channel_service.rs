use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Channel, ChannelPost, MessageContent, Story};
use crate::services::audit::{AuditRecord, QueuedAuditSink};
use crate::services::message_service::validate_content;
use crate::store::ChatStore;

/// Upper bound on a requested story lifetime.
const MAX_STORY_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Clone)]
pub struct ChannelService {
    store: Arc<dyn ChatStore>,
    audit: QueuedAuditSink,
    config: Arc<EngineConfig>,
}

impl ChannelService {
    pub fn new(store: Arc<dyn ChatStore>, audit: QueuedAuditSink, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    pub async fn create_channel(
        &self,
        owner_id: Uuid,
        name: &str,
        admin_ids: &[Uuid],
    ) -> AppResult<Channel> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("channel name is required".into()));
        }
        let mut channel = Channel::new(owner_id, name);
        channel
            .admins
            .extend(admin_ids.iter().copied().filter(|id| *id != owner_id));
        let channel = self.store.insert_channel(channel).await?;

        tracing::info!(channel_id = %channel.id, owner_id = %owner_id, "channel created");
        self.audit
            .submit(AuditRecord::new(owner_id, "channel_created", "channel", channel.id));
        Ok(channel)
    }

    pub async fn get_channel(&self, channel_id: Uuid) -> AppResult<Channel> {
        self.store
            .get_channel(channel_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Owner and channel admins only.
    pub async fn publish_post(
        &self,
        actor_id: Uuid,
        channel_id: Uuid,
        content: MessageContent,
    ) -> AppResult<ChannelPost> {
        let channel = self.get_channel(channel_id).await?;
        if !channel.can_publish(actor_id) {
            return Err(AppError::Forbidden);
        }
        validate_content(&content, &self.config)?;

        let post = self
            .store
            .insert_post(ChannelPost::new(channel.id, actor_id, content))
            .await?;
        tracing::info!(channel_id = %channel_id, post_id = %post.id, "channel post published");
        self.audit
            .submit(AuditRecord::new(actor_id, "post_published", "channel_post", post.id));
        Ok(post)
    }

    /// Readable by anyone; only the channel's publishers see who viewed it.
    pub async fn get_post(&self, actor_id: Uuid, post_id: Uuid) -> AppResult<ChannelPost> {
        let mut post = self
            .store
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if post.author_id != actor_id {
            let channel = self.get_channel(post.channel_id).await?;
            if !channel.can_publish(actor_id) {
                post.viewers.clear();
            }
        }
        Ok(post)
    }

    /// Post a story that expires after `ttl_secs`, or the configured default.
    pub async fn post_story(
        &self,
        actor_id: Uuid,
        content: MessageContent,
        ttl_secs: Option<u64>,
    ) -> AppResult<Story> {
        validate_content(&content, &self.config)?;
        let ttl = match ttl_secs {
            None => self.config.default_story_ttl,
            Some(0) => return Err(AppError::BadRequest("ttl must be positive".into())),
            Some(secs) if secs > MAX_STORY_TTL_SECS => {
                return Err(AppError::BadRequest("ttl is too long".into()))
            }
            Some(secs) => Duration::seconds(secs as i64),
        };

        let story = self.store.insert_story(Story::new(actor_id, content, ttl)).await?;
        tracing::info!(story_id = %story.id, author_id = %actor_id, expires_at = %story.expires_at, "story posted");
        self.audit
            .submit(AuditRecord::new(actor_id, "story_posted", "story", story.id));
        Ok(story)
    }

    /// Expired stories read as absent. Viewer records are for the author.
    pub async fn get_story(&self, actor_id: Uuid, story_id: Uuid) -> AppResult<Story> {
        let mut story = self
            .store
            .get_story(story_id)
            .await?
            .filter(|s| !s.is_expired(chrono::Utc::now()))
            .ok_or(AppError::NotFound)?;
        if story.author_id != actor_id {
            story.viewers.clear();
        }
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityRef;
    use crate::services::audit::TracingAuditSink;
    use crate::store::MemoryStore;

    fn service() -> ChannelService {
        let (audit, _) = QueuedAuditSink::spawn(Arc::new(TracingAuditSink), 16);
        ChannelService::new(
            Arc::new(MemoryStore::new()),
            audit,
            Arc::new(EngineConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_only_publishers_can_post() {
        let svc = service();
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let channel = svc.create_channel(owner, "news", &[admin]).await.unwrap();

        assert!(svc
            .publish_post(admin, channel.id, MessageContent::text("hi"))
            .await
            .is_ok());
        assert_eq!(
            svc.publish_post(Uuid::new_v4(), channel.id, MessageContent::text("hi"))
                .await
                .unwrap_err(),
            AppError::Forbidden
        );
        assert!(matches!(
            svc.publish_post(owner, channel.id, MessageContent::text("  ")).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_story_ttl() {
        let svc = service();
        let author = Uuid::new_v4();

        let story = svc
            .post_story(author, MessageContent::text("s"), None)
            .await
            .unwrap();
        assert_eq!(story.expires_at - story.created_at, Duration::hours(24));

        let short = svc
            .post_story(author, MessageContent::text("s"), Some(60))
            .await
            .unwrap();
        assert_eq!(short.expires_at - short.created_at, Duration::seconds(60));

        assert!(svc
            .post_story(author, MessageContent::text("s"), Some(0))
            .await
            .is_err());
        assert!(svc.get_story(author, story.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_viewer_lists_stay_with_publishers() {
        let svc = service();
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let channel = svc.create_channel(owner, "news", &[admin]).await.unwrap();
        let post = svc
            .publish_post(owner, channel.id, MessageContent::text("hi"))
            .await
            .unwrap();
        svc.store
            .add_view(EntityRef::channel_post(post.id), reader, chrono::Utc::now())
            .await
            .unwrap();

        let seen_by_admin = svc.get_post(admin, post.id).await.unwrap();
        assert!(seen_by_admin.viewers.contains(reader));
        let seen_by_reader = svc.get_post(reader, post.id).await.unwrap();
        assert!(seen_by_reader.viewers.is_empty());
        assert_eq!(seen_by_reader.view_count, 1);

        let story = svc
            .post_story(owner, MessageContent::text("s"), None)
            .await
            .unwrap();
        svc.store
            .add_view(EntityRef::story(story.id), reader, chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(svc.get_story(owner, story.id).await.unwrap().viewers.len(), 1);
        assert!(svc.get_story(reader, story.id).await.unwrap().viewers.is_empty());
    }
}
