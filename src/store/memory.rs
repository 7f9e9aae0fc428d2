//! In-process store.
//!
//! One `RwLock` guards all tables, so each trait call is atomic with respect
//! to every other call. Used by tests and by the binary when no database is
//! configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, GroupMutation, MessageQuery, SortOrder, StoreError, StoreResult};
use crate::models::{
    Channel, ChannelPost, Chat, EntityKind, EntityRef, ForwardStats, ForwardTarget, Group,
    Message, NewMessage, ReactionOutcome, Reactions, SenderProfile, Story, ViewOutcome,
};
use crate::services::engagement::{apply_forward, apply_reaction, apply_view};

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, SenderProfile>,
    chats: HashMap<Uuid, Chat>,
    private_pairs: HashMap<String, Uuid>,
    group_chats: HashMap<Uuid, Uuid>,
    groups: HashMap<Uuid, Group>,
    channels: HashMap<Uuid, Channel>,
    posts: HashMap<Uuid, ChannelPost>,
    stories: HashMap<Uuid, Story>,
    messages: HashMap<Uuid, Message>,
    // chat_id -> message ids in insertion order
    chat_messages: HashMap<Uuid, Vec<Uuid>>,
    last_seq: i64,
}

impl Tables {
    fn live_messages<'a>(&'a self, chat_id: Uuid) -> impl Iterator<Item = &'a Message> + 'a {
        self.chat_messages
            .get(&chat_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.messages.get(id))
            .filter(|m| !m.is_deleted)
    }
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<SenderProfile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: SenderProfile) -> StoreResult<()> {
        self.inner.write().await.profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn get_chat(&self, chat_id: Uuid) -> StoreResult<Option<Chat>> {
        Ok(self.inner.read().await.chats.get(&chat_id).cloned())
    }

    async fn find_private_chat(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Chat>> {
        let guard = self.inner.read().await;
        Ok(guard
            .private_pairs
            .get(&Chat::pair_key(a, b))
            .and_then(|id| guard.chats.get(id))
            .cloned())
    }

    async fn find_group_chat(&self, group_id: Uuid) -> StoreResult<Option<Chat>> {
        let guard = self.inner.read().await;
        Ok(guard
            .group_chats
            .get(&group_id)
            .and_then(|id| guard.chats.get(id))
            .cloned())
    }

    async fn insert_chat(&self, chat: Chat) -> StoreResult<Chat> {
        let mut guard = self.inner.write().await;

        let pair_key = chat.private_pair_key();
        if let Some(existing) = pair_key.as_ref().and_then(|k| guard.private_pairs.get(k)) {
            return Err(StoreError::Conflict(*existing));
        }
        if let Some(existing) = chat.group_id.and_then(|g| guard.group_chats.get(&g)) {
            return Err(StoreError::Conflict(*existing));
        }

        if let Some(key) = pair_key {
            guard.private_pairs.insert(key, chat.id);
        }
        if let Some(group_id) = chat.group_id {
            guard.group_chats.insert(group_id, chat.id);
        }
        guard.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn set_last_message(&self, chat_id: Uuid, message_id: Uuid) -> StoreResult<()> {
        let mut guard = self.inner.write().await;
        let chat = guard.chats.get_mut(&chat_id).ok_or(StoreError::NotFound)?;
        chat.last_message_id = Some(message_id);
        Ok(())
    }

    async fn set_chat_flags(
        &self,
        chat_id: Uuid,
        pinned: Option<bool>,
        muted: Option<bool>,
    ) -> StoreResult<Chat> {
        let mut guard = self.inner.write().await;
        let chat = guard.chats.get_mut(&chat_id).ok_or(StoreError::NotFound)?;
        if let Some(pinned) = pinned {
            chat.pinned = pinned;
        }
        if let Some(muted) = muted {
            chat.muted = muted;
        }
        Ok(chat.clone())
    }

    async fn get_group(&self, group_id: Uuid) -> StoreResult<Option<Group>> {
        Ok(self.inner.read().await.groups.get(&group_id).cloned())
    }

    async fn insert_group(&self, group: Group) -> StoreResult<Group> {
        let mut guard = self.inner.write().await;
        if guard.groups.contains_key(&group.id) {
            return Err(StoreError::Conflict(group.id));
        }
        guard.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn update_group(&self, group_id: Uuid, mutation: GroupMutation) -> StoreResult<Group> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;
        let group = tables.groups.get_mut(&group_id).ok_or(StoreError::NotFound)?;
        mutation.apply(group);
        let group = group.clone();
        if let Some(chat) = tables
            .group_chats
            .get(&group_id)
            .and_then(|chat_id| tables.chats.get_mut(chat_id))
        {
            chat.participants = group.members.clone();
        }
        Ok(group)
    }

    async fn insert_channel(&self, channel: Channel) -> StoreResult<Channel> {
        self.inner
            .write()
            .await
            .channels
            .insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn get_channel(&self, channel_id: Uuid) -> StoreResult<Option<Channel>> {
        Ok(self.inner.read().await.channels.get(&channel_id).cloned())
    }

    async fn insert_post(&self, post: ChannelPost) -> StoreResult<ChannelPost> {
        let mut guard = self.inner.write().await;
        if !guard.channels.contains_key(&post.channel_id) {
            return Err(StoreError::NotFound);
        }
        guard.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<ChannelPost>> {
        Ok(self.inner.read().await.posts.get(&post_id).cloned())
    }

    async fn insert_story(&self, story: Story) -> StoreResult<Story> {
        self.inner
            .write()
            .await
            .stories
            .insert(story.id, story.clone());
        Ok(story)
    }

    async fn get_story(&self, story_id: Uuid) -> StoreResult<Option<Story>> {
        Ok(self.inner.read().await.stories.get(&story_id).cloned())
    }

    async fn insert_message(&self, new: NewMessage) -> StoreResult<Message> {
        let mut guard = self.inner.write().await;
        if !guard.chats.contains_key(&new.chat_id) {
            return Err(StoreError::NotFound);
        }
        guard.last_seq += 1;
        let message = Message::from_new(new, guard.last_seq);
        guard
            .chat_messages
            .entry(message.chat_id)
            .or_default()
            .push(message.id);
        guard.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.inner.read().await.messages.get(&message_id).cloned())
    }

    async fn last_message_from(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
    ) -> StoreResult<Option<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .chat_messages
            .get(&chat_id)
            .into_iter()
            .flatten()
            .rev()
            .filter_map(|id| guard.messages.get(id))
            .find(|m| m.sender_id == sender_id)
            .cloned())
    }

    async fn edit_message(
        &self,
        message_id: Uuid,
        text: String,
        at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&message_id)
            .ok_or(StoreError::NotFound)?;
        message.apply_edit(text, at);
        Ok(message.clone())
    }

    async fn tombstone_message(&self, message_id: Uuid) -> StoreResult<Message> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&message_id)
            .ok_or(StoreError::NotFound)?;
        message.tombstone();
        Ok(message.clone())
    }

    async fn list_messages(&self, query: &MessageQuery) -> StoreResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut items: Vec<Message> = guard
            .live_messages(query.chat_id)
            .filter(|m| query.topic_id.map_or(true, |t| m.topic_id == Some(t)))
            .filter(|m| query.before_seq.map_or(true, |s| m.seq < s))
            .cloned()
            .collect();

        match query.order {
            SortOrder::NewestFirst => items.sort_by(|a, b| b.seq.cmp(&a.seq)),
            SortOrder::OldestFirst => items.sort_by(|a, b| a.seq.cmp(&b.seq)),
        }
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let mut guard = self.inner.write().await;
        let ids = guard.chat_messages.get(&chat_id).cloned().unwrap_or_default();
        let mut changed = 0;
        for id in ids {
            if let Some(message) = guard.messages.get_mut(&id) {
                if !message.is_deleted && message.read_by.insert(user_id) {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn count_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let guard = self.inner.read().await;
        Ok(guard
            .live_messages(chat_id)
            .filter(|m| m.sender_id != user_id && !m.read_by.contains(&user_id))
            .count() as u64)
    }

    async fn react(
        &self,
        entity: EntityRef,
        user_id: Uuid,
        emoji: &str,
    ) -> StoreResult<(ReactionOutcome, Reactions)> {
        let mut guard = self.inner.write().await;
        let result = match entity.kind {
            EntityKind::Message => guard
                .messages
                .get_mut(&entity.id)
                .map(|m| apply_reaction(m, user_id, emoji)),
            EntityKind::ChannelPost => guard
                .posts
                .get_mut(&entity.id)
                .map(|p| apply_reaction(p, user_id, emoji)),
            EntityKind::Story => guard
                .stories
                .get_mut(&entity.id)
                .map(|s| apply_reaction(s, user_id, emoji)),
        };
        result.ok_or(StoreError::NotFound)
    }

    async fn add_view(
        &self,
        entity: EntityRef,
        viewer_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<ViewOutcome> {
        let mut guard = self.inner.write().await;
        let result = match entity.kind {
            EntityKind::ChannelPost => guard
                .posts
                .get_mut(&entity.id)
                .map(|p| apply_view(p, viewer_id, at)),
            EntityKind::Story => guard
                .stories
                .get_mut(&entity.id)
                .map(|s| apply_view(s, viewer_id, at)),
            EntityKind::Message => None,
        };
        result.ok_or(StoreError::NotFound)
    }

    async fn record_forward(
        &self,
        source: EntityRef,
        target: ForwardTarget,
        at: DateTime<Utc>,
    ) -> StoreResult<ForwardStats> {
        let mut guard = self.inner.write().await;
        let result = match source.kind {
            EntityKind::Message => guard
                .messages
                .get_mut(&source.id)
                .map(|m| apply_forward(m, target, at)),
            EntityKind::ChannelPost => guard
                .posts
                .get_mut(&source.id)
                .map(|p| apply_forward(p, target, at)),
            EntityKind::Story => guard
                .stories
                .get_mut(&source.id)
                .map(|s| apply_forward(s, target, at)),
        };
        result.ok_or(StoreError::NotFound)
    }
}
