//! Broadcast channels, their posts, and ephemeral stories.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::engagement::{
    EntityRef, ForwardInfo, ForwardStats, Forwardable, Reactable, Reactions, Viewable, Viewers,
};
use super::message::{Message, MessageContent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub admins: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(owner_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id,
            admins: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn can_publish(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.admins.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPost {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub content: MessageContent,
    pub forward: Option<ForwardInfo>,
    pub reactions: Reactions,
    pub viewers: Viewers,
    /// Counted separately from `viewers`
    pub view_count: u64,
    pub forward_stats: ForwardStats,
    pub created_at: DateTime<Utc>,
}

impl ChannelPost {
    pub fn new(channel_id: Uuid, author_id: Uuid, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id,
            author_id,
            content,
            forward: None,
            reactions: Reactions::default(),
            viewers: Viewers::ids(),
            view_count: 0,
            forward_stats: ForwardStats::default(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: MessageContent,
    pub reactions: Reactions,
    pub viewers: Viewers,
    pub forward_stats: ForwardStats,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Story {
    pub fn new(author_id: Uuid, content: MessageContent, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id,
            content,
            reactions: Reactions::default(),
            viewers: Viewers::records(),
            forward_stats: ForwardStats::default(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// Capability impls
// ============================================================================

impl Reactable for Message {
    fn reactions(&self) -> &Reactions {
        &self.reactions
    }
    fn reactions_mut(&mut self) -> &mut Reactions {
        &mut self.reactions
    }
}

impl Forwardable for Message {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::message(self.id)
    }
    fn author_id(&self) -> Uuid {
        self.sender_id
    }
    fn forwardable_content(&self) -> &MessageContent {
        &self.content
    }
    fn forward_stats(&self) -> &ForwardStats {
        &self.forward_stats
    }
    fn forward_stats_mut(&mut self) -> &mut ForwardStats {
        &mut self.forward_stats
    }
}

impl Reactable for ChannelPost {
    fn reactions(&self) -> &Reactions {
        &self.reactions
    }
    fn reactions_mut(&mut self) -> &mut Reactions {
        &mut self.reactions
    }
}

impl Viewable for ChannelPost {
    fn viewers(&self) -> &Viewers {
        &self.viewers
    }
    fn viewers_mut(&mut self) -> &mut Viewers {
        &mut self.viewers
    }
    fn view_counter_mut(&mut self) -> Option<&mut u64> {
        Some(&mut self.view_count)
    }
}

impl Forwardable for ChannelPost {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::channel_post(self.id)
    }
    fn author_id(&self) -> Uuid {
        self.author_id
    }
    fn forwardable_content(&self) -> &MessageContent {
        &self.content
    }
    fn forward_stats(&self) -> &ForwardStats {
        &self.forward_stats
    }
    fn forward_stats_mut(&mut self) -> &mut ForwardStats {
        &mut self.forward_stats
    }
}

impl Reactable for Story {
    fn reactions(&self) -> &Reactions {
        &self.reactions
    }
    fn reactions_mut(&mut self) -> &mut Reactions {
        &mut self.reactions
    }
}

impl Viewable for Story {
    fn viewers(&self) -> &Viewers {
        &self.viewers
    }
    fn viewers_mut(&mut self) -> &mut Viewers {
        &mut self.viewers
    }
}

impl Forwardable for Story {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::story(self.id)
    }
    fn author_id(&self) -> Uuid {
        self.author_id
    }
    fn forwardable_content(&self) -> &MessageContent {
        &self.content
    }
    fn forward_stats(&self) -> &ForwardStats {
        &self.forward_stats
    }
    fn forward_stats_mut(&mut self) -> &mut ForwardStats {
        &mut self.forward_stats
    }
}
