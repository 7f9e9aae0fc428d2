//! Persistence seam.
//!
//! Every mutation of a shared set or counter (reactions, viewers, `read_by`,
//! forward counters, private-pair and group-chat uniqueness) is one atomic
//! store call. Callers never read a set, decide, and write it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Channel, ChannelPost, Chat, EntityRef, ForwardStats, ForwardTarget, Group, GroupSettings,
    Message, NewMessage, ReactionOutcome, Reactions, SenderProfile, Story, ViewOutcome,
};
use crate::permissions::PermissionOverrides;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflicts with existing record {0}")]
    Conflict(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(format!("serialization: {e}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

/// Listing filter; deleted messages are always excluded.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub chat_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub before_seq: Option<i64>,
    pub limit: Option<usize>,
    pub order: SortOrder,
}

/// Targeted group updates, applied atomically against the current row.
#[derive(Debug, Clone)]
pub enum GroupMutation {
    AddMember(Uuid),
    PromoteAdmin(Uuid),
    Rename(String),
    MergePermissions(PermissionOverrides),
    SetException {
        user_id: Uuid,
        overrides: PermissionOverrides,
    },
    SetSettings(GroupSettings),
}

impl GroupMutation {
    pub fn apply(&self, group: &mut Group) {
        match self {
            GroupMutation::AddMember(user_id) => {
                group.members.insert(*user_id);
            }
            GroupMutation::PromoteAdmin(user_id) => {
                group.members.insert(*user_id);
                group.admins.insert(*user_id);
            }
            GroupMutation::Rename(name) => group.name = name.clone(),
            GroupMutation::MergePermissions(update) => {
                group.permissions = group.permissions.merged_with(*update);
            }
            GroupMutation::SetException { user_id, overrides } => {
                group.set_exception(*user_id, *overrides);
            }
            GroupMutation::SetSettings(settings) => group.settings = settings.clone(),
        }
    }
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    // ---- profiles ---------------------------------------------------------
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<SenderProfile>>;
    async fn upsert_profile(&self, profile: SenderProfile) -> StoreResult<()>;

    // ---- chats ------------------------------------------------------------
    async fn get_chat(&self, chat_id: Uuid) -> StoreResult<Option<Chat>>;
    async fn find_private_chat(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Chat>>;
    async fn find_group_chat(&self, group_id: Uuid) -> StoreResult<Option<Chat>>;
    /// Fails with [`StoreError::Conflict`] carrying the existing chat id when
    /// the private pair or the group is already bound to a chat.
    async fn insert_chat(&self, chat: Chat) -> StoreResult<Chat>;
    async fn set_last_message(&self, chat_id: Uuid, message_id: Uuid) -> StoreResult<()>;
    async fn set_chat_flags(
        &self,
        chat_id: Uuid,
        pinned: Option<bool>,
        muted: Option<bool>,
    ) -> StoreResult<Chat>;

    // ---- groups -----------------------------------------------------------
    async fn get_group(&self, group_id: Uuid) -> StoreResult<Option<Group>>;
    async fn insert_group(&self, group: Group) -> StoreResult<Group>;
    async fn update_group(&self, group_id: Uuid, mutation: GroupMutation) -> StoreResult<Group>;

    // ---- channels and stories ---------------------------------------------
    async fn insert_channel(&self, channel: Channel) -> StoreResult<Channel>;
    async fn get_channel(&self, channel_id: Uuid) -> StoreResult<Option<Channel>>;
    async fn insert_post(&self, post: ChannelPost) -> StoreResult<ChannelPost>;
    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<ChannelPost>>;
    async fn insert_story(&self, story: Story) -> StoreResult<Story>;
    async fn get_story(&self, story_id: Uuid) -> StoreResult<Option<Story>>;

    // ---- messages ---------------------------------------------------------
    async fn insert_message(&self, new: NewMessage) -> StoreResult<Message>;
    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>>;
    /// Most recent message by `sender_id` in the chat, tombstones included.
    async fn last_message_from(&self, chat_id: Uuid, sender_id: Uuid)
        -> StoreResult<Option<Message>>;
    async fn edit_message(
        &self,
        message_id: Uuid,
        text: String,
        at: DateTime<Utc>,
    ) -> StoreResult<Message>;
    async fn tombstone_message(&self, message_id: Uuid) -> StoreResult<Message>;
    async fn list_messages(&self, query: &MessageQuery) -> StoreResult<Vec<Message>>;

    // ---- read tracking ----------------------------------------------------
    /// Adds `user_id` to `read_by` of every live message lacking it.
    /// Returns the number of messages changed.
    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<u64>;
    async fn count_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<u64>;

    // ---- engagement -------------------------------------------------------
    async fn react(
        &self,
        entity: EntityRef,
        user_id: Uuid,
        emoji: &str,
    ) -> StoreResult<(ReactionOutcome, Reactions)>;
    async fn add_view(
        &self,
        entity: EntityRef,
        viewer_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<ViewOutcome>;
    async fn record_forward(
        &self,
        source: EntityRef,
        target: ForwardTarget,
        at: DateTime<Utc>,
    ) -> StoreResult<ForwardStats>;
}
