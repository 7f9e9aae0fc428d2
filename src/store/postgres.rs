//! PostgreSQL store over a deadpool pool.
//!
//! Shared sets live in their own tables keyed for uniqueness:
//! `entity_reactions (entity_kind, entity_id, user_id)` gives the single
//! reaction slot, `entity_views (entity_kind, entity_id, viewer_id)` gives
//! view deduplication, and `messages.read_by` is only ever grown with a
//! conditional `array_append`. Forward counters are upserted in
//! `entity_forwards`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::{BTreeSet, HashMap};
use tokio_postgres::{GenericClient, Row};
use uuid::Uuid;

use super::{ChatStore, GroupMutation, MessageQuery, SortOrder, StoreError, StoreResult};
use crate::models::{
    Channel, ChannelPost, Chat, ChatKind, EntityKind, EntityRef, ForwardStats, ForwardTarget,
    Group, Message, MessageContent, NewMessage, ReactionOutcome, Reactions, SenderProfile, Story,
    ViewOutcome, ViewRecord, Viewers,
};

const CHAT_COLUMNS: &str =
    "id, kind, participants, group_id, last_message_id, pinned, muted, created_at";

const GROUP_COLUMNS: &str =
    "id, name, owner_id, members, admins, permissions, exceptions, settings, created_at";

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.chat_id, m.sender_id, m.seq, m.content, m.reply_to, m.topic_id,
           m.forward, m.is_edited, m.is_deleted, m.read_by, m.created_at, m.edited_at,
           COALESCE(f.forward_count, 0), f.last_target, f.last_forwarded_at
    FROM messages m
    LEFT JOIN entity_forwards f ON f.entity_kind = 'message' AND f.entity_id = m.id
"#;

const POST_SELECT: &str = r#"
    SELECT p.id, p.channel_id, p.author_id, p.content, p.forward, p.view_count, p.created_at,
           COALESCE(f.forward_count, 0), f.last_target, f.last_forwarded_at
    FROM channel_posts p
    LEFT JOIN entity_forwards f ON f.entity_kind = 'channel_post' AND f.entity_id = p.id
"#;

const STORY_SELECT: &str = r#"
    SELECT s.id, s.author_id, s.content, s.created_at, s.expires_at,
           COALESCE(f.forward_count, 0), f.last_target, f.last_forwarded_at
    FROM stories s
    LEFT JOIN entity_forwards f ON f.entity_kind = 'story' AND f.entity_id = s.id
"#;

fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Message => "messages",
        EntityKind::ChannelPost => "channel_posts",
        EntityKind::Story => "stories",
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> StoreResult<T> {
    Ok(serde_json::from_value(value)?)
}

fn opt_json<T: serde::de::DeserializeOwned>(
    value: Option<serde_json::Value>,
) -> StoreResult<Option<T>> {
    value.map(json).transpose()
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

fn uuid_set(ids: Vec<Uuid>) -> BTreeSet<Uuid> {
    ids.into_iter().collect()
}

fn forward_stats_at(row: &Row, base: usize) -> StoreResult<ForwardStats> {
    let count: i64 = row.get(base);
    Ok(ForwardStats {
        count: count.max(0) as u64,
        last_forwarded_to: opt_json(row.get(base + 1))?,
        last_forwarded_at: row.get(base + 2),
    })
}

fn chat_from_row(row: &Row) -> StoreResult<Chat> {
    let kind: String = row.get(1);
    Ok(Chat {
        id: row.get(0),
        kind: ChatKind::from_db(&kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown chat kind: {kind}")))?,
        participants: uuid_set(row.get(2)),
        group_id: row.get(3),
        last_message_id: row.get(4),
        pinned: row.get(5),
        muted: row.get(6),
        created_at: row.get(7),
    })
}

fn group_from_row(row: &Row) -> StoreResult<Group> {
    Ok(Group {
        id: row.get(0),
        name: row.get(1),
        owner_id: row.get(2),
        members: uuid_set(row.get(3)),
        admins: uuid_set(row.get(4)),
        permissions: json(row.get(5))?,
        exceptions: json(row.get(6))?,
        settings: json(row.get(7))?,
        created_at: row.get(8),
    })
}

fn message_from_row(row: &Row) -> StoreResult<Message> {
    Ok(Message {
        id: row.get(0),
        chat_id: row.get(1),
        sender_id: row.get(2),
        seq: row.get(3),
        content: json(row.get(4))?,
        reply_to: row.get(5),
        topic_id: row.get(6),
        forward: opt_json(row.get(7))?,
        is_edited: row.get(8),
        is_deleted: row.get(9),
        read_by: uuid_set(row.get(10)),
        reactions: Reactions::default(),
        forward_stats: forward_stats_at(row, 13)?,
        created_at: row.get(11),
        edited_at: row.get(12),
    })
}

fn post_from_row(row: &Row) -> StoreResult<ChannelPost> {
    let view_count: i64 = row.get(5);
    Ok(ChannelPost {
        id: row.get(0),
        channel_id: row.get(1),
        author_id: row.get(2),
        content: json(row.get(3))?,
        forward: opt_json(row.get(4))?,
        reactions: Reactions::default(),
        viewers: Viewers::ids(),
        view_count: view_count.max(0) as u64,
        forward_stats: forward_stats_at(row, 7)?,
        created_at: row.get(6),
    })
}

fn story_from_row(row: &Row) -> StoreResult<Story> {
    Ok(Story {
        id: row.get(0),
        author_id: row.get(1),
        content: json(row.get(2))?,
        reactions: Reactions::default(),
        viewers: Viewers::records(),
        forward_stats: forward_stats_at(row, 5)?,
        created_at: row.get(3),
        expires_at: row.get(4),
    })
}

// ============================================================================
// Engagement helpers
// ============================================================================

async fn entity_exists<C: GenericClient + Sync>(
    client: &C,
    entity: EntityRef,
) -> StoreResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
        entity_table(entity.kind)
    );
    let row = client.query_one(sql.as_str(), &[&entity.id]).await?;
    Ok(row.get(0))
}

/// Reaction summaries for a batch of entities of one kind.
async fn load_reactions<C: GenericClient + Sync>(
    client: &C,
    kind: EntityKind,
    ids: &[Uuid],
) -> StoreResult<HashMap<Uuid, Reactions>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = client
        .query(
            "SELECT entity_id, user_id, emoji FROM entity_reactions \
             WHERE entity_kind = $1 AND entity_id = ANY($2) ORDER BY created_at",
            &[&kind.to_db(), &ids],
        )
        .await?;

    let mut grouped: HashMap<Uuid, Vec<(Uuid, String)>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.get(0))
            .or_default()
            .push((row.get(1), row.get(2)));
    }
    Ok(grouped
        .into_iter()
        .map(|(id, rows)| (id, Reactions::from_rows(rows)))
        .collect())
}

async fn load_view_records<C: GenericClient + Sync>(
    client: &C,
    entity: EntityRef,
) -> StoreResult<Vec<ViewRecord>> {
    let rows = client
        .query(
            "SELECT viewer_id, viewed_at FROM entity_views \
             WHERE entity_kind = $1 AND entity_id = $2 ORDER BY viewed_at",
            &[&entity.kind.to_db(), &entity.id],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| ViewRecord {
            viewer_id: row.get(0),
            viewed_at: row.get(1),
        })
        .collect())
}

async fn hydrate_messages<C: GenericClient + Sync>(
    client: &C,
    mut messages: Vec<Message>,
) -> StoreResult<Vec<Message>> {
    let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
    let mut reactions = load_reactions(client, EntityKind::Message, &ids).await?;
    for message in &mut messages {
        if let Some(r) = reactions.remove(&message.id) {
            message.reactions = r;
        }
    }
    Ok(messages)
}

#[async_trait]
impl ChatStore for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<SenderProfile>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, display_name, avatar_url FROM profiles WHERE id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.map(|r| SenderProfile {
            id: r.get(0),
            display_name: r.get(1),
            avatar_url: r.get(2),
        }))
    }

    async fn upsert_profile(&self, profile: SenderProfile) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO profiles (id, display_name, avatar_url) VALUES ($1, $2, $3) \
                 ON CONFLICT (id) DO UPDATE \
                 SET display_name = EXCLUDED.display_name, avatar_url = EXCLUDED.avatar_url",
                &[&profile.id, &profile.display_name, &profile.avatar_url],
            )
            .await?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: Uuid) -> StoreResult<Option<Chat>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1");
        client
            .query_opt(sql.as_str(), &[&chat_id])
            .await?
            .as_ref()
            .map(chat_from_row)
            .transpose()
    }

    async fn find_private_chat(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Chat>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE pair_key = $1");
        client
            .query_opt(sql.as_str(), &[&Chat::pair_key(a, b)])
            .await?
            .as_ref()
            .map(chat_from_row)
            .transpose()
    }

    async fn find_group_chat(&self, group_id: Uuid) -> StoreResult<Option<Chat>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE group_id = $1");
        client
            .query_opt(sql.as_str(), &[&group_id])
            .await?
            .as_ref()
            .map(chat_from_row)
            .transpose()
    }

    async fn insert_chat(&self, chat: Chat) -> StoreResult<Chat> {
        let client = self.pool.get().await?;
        let pair_key = chat.private_pair_key();
        let participants: Vec<Uuid> = chat.participants.iter().copied().collect();

        // Unique indexes on pair_key and group_id arbitrate concurrent creates
        let inserted = client
            .query_opt(
                "INSERT INTO chats (id, kind, participants, group_id, pair_key, last_message_id, \
                                    pinned, muted, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT DO NOTHING RETURNING id",
                &[
                    &chat.id,
                    &chat.kind.to_db(),
                    &participants,
                    &chat.group_id,
                    &pair_key,
                    &chat.last_message_id,
                    &chat.pinned,
                    &chat.muted,
                    &chat.created_at,
                ],
            )
            .await?;

        if inserted.is_some() {
            return Ok(chat);
        }

        let existing = client
            .query_opt(
                "SELECT id FROM chats WHERE ($1::text IS NOT NULL AND pair_key = $1) \
                    OR ($2::uuid IS NOT NULL AND group_id = $2) OR id = $3 LIMIT 1",
                &[&pair_key, &chat.group_id, &chat.id],
            )
            .await?
            .ok_or_else(|| StoreError::Backend("chat insert skipped without conflict".into()))?;
        Err(StoreError::Conflict(existing.get(0)))
    }

    async fn set_last_message(&self, chat_id: Uuid, message_id: Uuid) -> StoreResult<()> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE chats SET last_message_id = $2 WHERE id = $1",
                &[&chat_id, &message_id],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_chat_flags(
        &self,
        chat_id: Uuid,
        pinned: Option<bool>,
        muted: Option<bool>,
    ) -> StoreResult<Chat> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE chats SET pinned = COALESCE($2, pinned), muted = COALESCE($3, muted) \
             WHERE id = $1 RETURNING {CHAT_COLUMNS}"
        );
        let row = client
            .query_opt(sql.as_str(), &[&chat_id, &pinned, &muted])
            .await?
            .ok_or(StoreError::NotFound)?;
        chat_from_row(&row)
    }

    async fn get_group(&self, group_id: Uuid) -> StoreResult<Option<Group>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1");
        client
            .query_opt(sql.as_str(), &[&group_id])
            .await?
            .as_ref()
            .map(group_from_row)
            .transpose()
    }

    async fn insert_group(&self, group: Group) -> StoreResult<Group> {
        let client = self.pool.get().await?;
        let members: Vec<Uuid> = group.members.iter().copied().collect();
        let admins: Vec<Uuid> = group.admins.iter().copied().collect();
        let inserted = client
            .execute(
                "INSERT INTO groups (id, name, owner_id, members, admins, permissions, exceptions, \
                                     settings, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (id) DO NOTHING",
                &[
                    &group.id,
                    &group.name,
                    &group.owner_id,
                    &members,
                    &admins,
                    &to_json(&group.permissions)?,
                    &to_json(&group.exceptions)?,
                    &to_json(&group.settings)?,
                    &group.created_at,
                ],
            )
            .await?;
        if inserted == 0 {
            return Err(StoreError::Conflict(group.id));
        }
        Ok(group)
    }

    async fn update_group(&self, group_id: Uuid, mutation: GroupMutation) -> StoreResult<Group> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1 FOR UPDATE");
        let row = tx
            .query_opt(sql.as_str(), &[&group_id])
            .await?
            .ok_or(StoreError::NotFound)?;
        let mut group = group_from_row(&row)?;
        mutation.apply(&mut group);

        let members: Vec<Uuid> = group.members.iter().copied().collect();
        let admins: Vec<Uuid> = group.admins.iter().copied().collect();
        tx.execute(
            "UPDATE groups SET name = $2, members = $3, admins = $4, permissions = $5, \
                               exceptions = $6, settings = $7 WHERE id = $1",
            &[
                &group.id,
                &group.name,
                &members,
                &admins,
                &to_json(&group.permissions)?,
                &to_json(&group.exceptions)?,
                &to_json(&group.settings)?,
            ],
        )
        .await?;

        // Keep the group-backed chat's participant snapshot aligned
        tx.execute(
            "UPDATE chats SET participants = $2 WHERE group_id = $1",
            &[&group.id, &members],
        )
        .await?;

        tx.commit().await?;
        Ok(group)
    }

    async fn insert_channel(&self, channel: Channel) -> StoreResult<Channel> {
        let client = self.pool.get().await?;
        let admins: Vec<Uuid> = channel.admins.iter().copied().collect();
        client
            .execute(
                "INSERT INTO channels (id, name, owner_id, admins, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &channel.id,
                    &channel.name,
                    &channel.owner_id,
                    &admins,
                    &channel.created_at,
                ],
            )
            .await?;
        Ok(channel)
    }

    async fn get_channel(&self, channel_id: Uuid) -> StoreResult<Option<Channel>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, name, owner_id, admins, created_at FROM channels WHERE id = $1",
                &[&channel_id],
            )
            .await?;
        Ok(row.map(|r| Channel {
            id: r.get(0),
            name: r.get(1),
            owner_id: r.get(2),
            admins: uuid_set(r.get(3)),
            created_at: r.get(4),
        }))
    }

    async fn insert_post(&self, post: ChannelPost) -> StoreResult<ChannelPost> {
        let client = self.pool.get().await?;
        let view_count = post.view_count as i64;
        let inserted = client
            .execute(
                "INSERT INTO channel_posts (id, channel_id, author_id, content, forward, \
                                            view_count, created_at) \
                 SELECT $1, $2, $3, $4, $5, $6, $7 WHERE EXISTS (SELECT 1 FROM channels WHERE id = $2)",
                &[
                    &post.id,
                    &post.channel_id,
                    &post.author_id,
                    &to_json(&post.content)?,
                    &post.forward.as_ref().map(to_json).transpose()?,
                    &view_count,
                    &post.created_at,
                ],
            )
            .await?;
        if inserted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(post)
    }

    async fn get_post(&self, post_id: Uuid) -> StoreResult<Option<ChannelPost>> {
        let client = self.pool.get().await?;
        let sql = format!("{POST_SELECT} WHERE p.id = $1");
        let Some(row) = client.query_opt(sql.as_str(), &[&post_id]).await? else {
            return Ok(None);
        };
        let mut post = post_from_row(&row)?;
        let entity = EntityRef::channel_post(post.id);
        if let Some(r) = load_reactions(&**client, entity.kind, &[post.id]).await?.remove(&post.id)
        {
            post.reactions = r;
        }
        post.viewers = Viewers::Ids(
            load_view_records(&**client, entity)
                .await?
                .into_iter()
                .map(|v| v.viewer_id)
                .collect(),
        );
        Ok(Some(post))
    }

    async fn insert_story(&self, story: Story) -> StoreResult<Story> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO stories (id, author_id, content, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &story.id,
                    &story.author_id,
                    &to_json(&story.content)?,
                    &story.created_at,
                    &story.expires_at,
                ],
            )
            .await?;
        Ok(story)
    }

    async fn get_story(&self, story_id: Uuid) -> StoreResult<Option<Story>> {
        let client = self.pool.get().await?;
        let sql = format!("{STORY_SELECT} WHERE s.id = $1");
        let Some(row) = client.query_opt(sql.as_str(), &[&story_id]).await? else {
            return Ok(None);
        };
        let mut story = story_from_row(&row)?;
        let entity = EntityRef::story(story.id);
        if let Some(r) = load_reactions(&**client, entity.kind, &[story.id])
            .await?
            .remove(&story.id)
        {
            story.reactions = r;
        }
        story.viewers = Viewers::Records(load_view_records(&**client, entity).await?);
        Ok(Some(story))
    }

    async fn insert_message(&self, new: NewMessage) -> StoreResult<Message> {
        let client = self.pool.get().await?;
        let read_by = vec![new.sender_id];
        let row = client
            .query_opt(
                "INSERT INTO messages (id, chat_id, sender_id, content, reply_to, topic_id, \
                                       forward, read_by, created_at) \
                 SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9 \
                 WHERE EXISTS (SELECT 1 FROM chats WHERE id = $2) \
                 RETURNING seq",
                &[
                    &new.id,
                    &new.chat_id,
                    &new.sender_id,
                    &to_json(&new.content)?,
                    &new.reply_to,
                    &new.topic_id,
                    &new.forward.as_ref().map(to_json).transpose()?,
                    &read_by,
                    &new.created_at,
                ],
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(Message::from_new(new, row.get(0)))
    }

    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        let client = self.pool.get().await?;
        let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
        let Some(row) = client.query_opt(sql.as_str(), &[&message_id]).await? else {
            return Ok(None);
        };
        let message = message_from_row(&row)?;
        Ok(hydrate_messages(&**client, vec![message]).await?.pop())
    }

    async fn last_message_from(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
    ) -> StoreResult<Option<Message>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "{MESSAGE_SELECT} WHERE m.chat_id = $1 AND m.sender_id = $2 ORDER BY m.seq DESC LIMIT 1"
        );
        client
            .query_opt(sql.as_str(), &[&chat_id, &sender_id])
            .await?
            .as_ref()
            .map(message_from_row)
            .transpose()
    }

    async fn edit_message(
        &self,
        message_id: Uuid,
        text: String,
        at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE messages \
                 SET content = jsonb_set(content, '{text}', to_jsonb($2::text)), \
                     is_edited = TRUE, edited_at = $3 \
                 WHERE id = $1",
                &[&message_id, &text, &at],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        drop(client);
        self.get_message(message_id).await?.ok_or(StoreError::NotFound)
    }

    async fn tombstone_message(&self, message_id: Uuid) -> StoreResult<Message> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT content FROM messages WHERE id = $1", &[&message_id])
            .await?
            .ok_or(StoreError::NotFound)?;
        let mut content: MessageContent = json(row.get(0))?;
        content.text = None;
        content.media_url = None;
        content.file_name = None;
        content.file_size = None;
        content.duration_secs = None;
        content.mime_type = None;

        client
            .execute(
                "UPDATE messages SET is_deleted = TRUE, content = $2 WHERE id = $1",
                &[&message_id, &to_json(&content)?],
            )
            .await?;
        drop(client);
        self.get_message(message_id).await?.ok_or(StoreError::NotFound)
    }

    async fn list_messages(&self, query: &MessageQuery) -> StoreResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let order = match query.order {
            SortOrder::NewestFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        };
        let sql = format!(
            "{MESSAGE_SELECT} WHERE m.chat_id = $1 AND NOT m.is_deleted \
               AND ($2::uuid IS NULL OR m.topic_id = $2) \
               AND ($3::bigint IS NULL OR m.seq < $3) \
             ORDER BY m.seq {order} LIMIT $4"
        );
        let limit = query.limit.map(|l| l as i64);
        let rows = client
            .query(
                sql.as_str(),
                &[&query.chat_id, &query.topic_id, &query.before_seq, &limit],
            )
            .await?;
        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        hydrate_messages(&**client, messages).await
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let client = self.pool.get().await?;
        let changed = client
            .execute(
                "UPDATE messages SET read_by = array_append(read_by, $2) \
                 WHERE chat_id = $1 AND NOT is_deleted AND NOT ($2 = ANY(read_by))",
                &[&chat_id, &user_id],
            )
            .await?;
        Ok(changed)
    }

    async fn count_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM messages \
                 WHERE chat_id = $1 AND NOT is_deleted AND sender_id <> $2 \
                   AND NOT ($2 = ANY(read_by))",
                &[&chat_id, &user_id],
            )
            .await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn react(
        &self,
        entity: EntityRef,
        user_id: Uuid,
        emoji: &str,
    ) -> StoreResult<(ReactionOutcome, Reactions)> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        if !entity_exists(&*tx, entity).await? {
            return Err(StoreError::NotFound);
        }

        let kind = entity.kind.to_db();
        let removed = tx
            .execute(
                "DELETE FROM entity_reactions \
                 WHERE entity_kind = $1 AND entity_id = $2 AND user_id = $3 AND emoji = $4",
                &[&kind, &entity.id, &user_id, &emoji],
            )
            .await?;

        let outcome = if removed > 0 {
            ReactionOutcome::Removed
        } else {
            // The primary key holds one slot per user; a different emoji moves it
            tx.execute(
                "INSERT INTO entity_reactions (entity_kind, entity_id, user_id, emoji, created_at) \
                 VALUES ($1, $2, $3, $4, NOW()) \
                 ON CONFLICT (entity_kind, entity_id, user_id) \
                 DO UPDATE SET emoji = EXCLUDED.emoji, created_at = EXCLUDED.created_at",
                &[&kind, &entity.id, &user_id, &emoji],
            )
            .await?;
            ReactionOutcome::Updated
        };

        let summary = load_reactions(&*tx, entity.kind, &[entity.id])
            .await?
            .remove(&entity.id)
            .unwrap_or_default();
        tx.commit().await?;
        Ok((outcome, summary))
    }

    async fn add_view(
        &self,
        entity: EntityRef,
        viewer_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<ViewOutcome> {
        if entity.kind == EntityKind::Message {
            return Err(StoreError::NotFound);
        }
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        if !entity_exists(&*tx, entity).await? {
            return Err(StoreError::NotFound);
        }

        let inserted = tx
            .execute(
                "INSERT INTO entity_views (entity_kind, entity_id, viewer_id, viewed_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
                &[&entity.kind.to_db(), &entity.id, &viewer_id, &at],
            )
            .await?;
        if inserted == 0 {
            return Ok(ViewOutcome::AlreadyCounted);
        }
        if entity.kind == EntityKind::ChannelPost {
            tx.execute(
                "UPDATE channel_posts SET view_count = view_count + 1 WHERE id = $1",
                &[&entity.id],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(ViewOutcome::Counted)
    }

    async fn record_forward(
        &self,
        source: EntityRef,
        target: ForwardTarget,
        at: DateTime<Utc>,
    ) -> StoreResult<ForwardStats> {
        let client = self.pool.get().await?;
        if !entity_exists(&**client, source).await? {
            return Err(StoreError::NotFound);
        }
        let row = client
            .query_one(
                "INSERT INTO entity_forwards (entity_kind, entity_id, forward_count, last_target, \
                                              last_forwarded_at) \
                 VALUES ($1, $2, 1, $3, $4) \
                 ON CONFLICT (entity_kind, entity_id) DO UPDATE \
                 SET forward_count = entity_forwards.forward_count + 1, \
                     last_target = EXCLUDED.last_target, \
                     last_forwarded_at = EXCLUDED.last_forwarded_at \
                 RETURNING forward_count, last_target, last_forwarded_at",
                &[&source.kind.to_db(), &source.id, &to_json(&target)?, &at],
            )
            .await?;
        forward_stats_at(&row, 0)
    }
}
