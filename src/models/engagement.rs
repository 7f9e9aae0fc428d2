//! Reaction, view and forward state shared by every content entity.
//!
//! Each entity type opts into the engine by implementing [`Reactable`],
//! [`Viewable`] and/or [`Forwardable`]; the engine never touches entity
//! fields directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::message::MessageContent;

// ============================================================================
// Entity locator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Message,
    ChannelPost,
    Story,
}

impl EntityKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "message" => Some(Self::Message),
            "channel_post" => Some(Self::ChannelPost),
            "story" => Some(Self::Story),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ChannelPost => "channel_post",
            Self::Story => "story",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Path segments use the plural/kebab form
        let normalized = match s {
            "messages" => "message",
            "posts" | "channel-posts" | "channel_posts" => "channel_post",
            "stories" => "story",
            other => other,
        };
        Self::from_db(normalized).ok_or_else(|| format!("unknown entity kind: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn message(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Message,
            id,
        }
    }

    pub fn channel_post(id: Uuid) -> Self {
        Self {
            kind: EntityKind::ChannelPost,
            id,
        }
    }

    pub fn story(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Story,
            id,
        }
    }
}

// ============================================================================
// Reactions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    pub reactors: BTreeSet<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionOutcome {
    Removed,
    Updated,
}

/// Reaction list keyed by emoji.
///
/// Invariants: `count == reactors.len()` for every entry, a user id appears in
/// at most one entry, and entries with no reactors are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(Vec<Reaction>);

impl Reactions {
    /// Rebuild from `(user, emoji)` rows, as stored by the relational backend.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, String)>,
    {
        let mut reactions = Self::default();
        for (user_id, emoji) in rows {
            reactions.toggle(user_id, &emoji);
        }
        reactions
    }

    pub fn entries(&self) -> &[Reaction] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, emoji: &str) -> u32 {
        self.0
            .iter()
            .find(|r| r.emoji == emoji)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    pub fn reactors(&self, emoji: &str) -> Option<&BTreeSet<Uuid>> {
        self.0.iter().find(|r| r.emoji == emoji).map(|r| &r.reactors)
    }

    /// The emoji `user_id` currently reacts with, if any.
    pub fn emoji_of(&self, user_id: Uuid) -> Option<&str> {
        self.0
            .iter()
            .find(|r| r.reactors.contains(&user_id))
            .map(|r| r.emoji.as_str())
    }

    /// Single-slot toggle: same emoji removes, different emoji moves.
    pub fn toggle(&mut self, user_id: Uuid, emoji: &str) -> ReactionOutcome {
        let current = self.emoji_of(user_id).map(str::to_owned);

        if current.as_deref() == Some(emoji) {
            self.remove(user_id, emoji);
            return ReactionOutcome::Removed;
        }
        if let Some(old) = current {
            self.remove(user_id, &old);
        }

        match self.0.iter_mut().find(|r| r.emoji == emoji) {
            Some(entry) => {
                entry.reactors.insert(user_id);
                entry.count = entry.reactors.len() as u32;
            }
            None => self.0.push(Reaction {
                emoji: emoji.to_string(),
                count: 1,
                reactors: [user_id].into_iter().collect(),
            }),
        }
        ReactionOutcome::Updated
    }

    fn remove(&mut self, user_id: Uuid, emoji: &str) {
        if let Some(entry) = self.0.iter_mut().find(|r| r.emoji == emoji) {
            entry.reactors.remove(&user_id);
            entry.count = entry.reactors.len() as u32;
        }
        self.0.retain(|r| r.count > 0);
    }
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub viewer_id: Uuid,
    pub viewed_at: DateTime<Utc>,
}

/// Deduplicated viewers, either as bare ids or timestamped records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "entries", rename_all = "snake_case")]
pub enum Viewers {
    Ids(BTreeSet<Uuid>),
    Records(Vec<ViewRecord>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewOutcome {
    Counted,
    AlreadyCounted,
}

impl Viewers {
    pub fn ids() -> Self {
        Self::Ids(BTreeSet::new())
    }

    pub fn records() -> Self {
        Self::Records(Vec::new())
    }

    pub fn contains(&self, viewer_id: Uuid) -> bool {
        match self {
            Self::Ids(ids) => ids.contains(&viewer_id),
            Self::Records(records) => records.iter().any(|r| r.viewer_id == viewer_id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Ids(ids) => ids.len(),
            Self::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `false` when the viewer was already present.
    pub fn insert(&mut self, viewer_id: Uuid, at: DateTime<Utc>) -> bool {
        if self.contains(viewer_id) {
            return false;
        }
        match self {
            Self::Ids(ids) => {
                ids.insert(viewer_id);
            }
            Self::Records(records) => records.push(ViewRecord {
                viewer_id,
                viewed_at: at,
            }),
        }
        true
    }

    /// Drops the viewer identities, keeping the shape.
    pub fn clear(&mut self) {
        match self {
            Self::Ids(ids) => ids.clear(),
            Self::Records(records) => records.clear(),
        }
    }
}

// ============================================================================
// Forwarding
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardTargetKind {
    Chat,
    Group,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    #[serde(rename = "type")]
    pub kind: ForwardTargetKind,
    pub id: Uuid,
}

/// Forward bookkeeping on the source entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardStats {
    pub count: u64,
    pub last_forwarded_to: Option<ForwardTarget>,
    pub last_forwarded_at: Option<DateTime<Utc>>,
}

impl ForwardStats {
    pub fn record(&mut self, target: ForwardTarget, at: DateTime<Utc>) {
        self.count += 1;
        self.last_forwarded_to = Some(target);
        self.last_forwarded_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardOrigin {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: Uuid,
    pub author_id: Uuid,
}

/// Provenance carried by an entity created through a forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardInfo {
    pub forwarded_by: Uuid,
    pub forwarded_at: DateTime<Utc>,
    pub original: ForwardOrigin,
    pub snapshot: MessageContent,
}

// ============================================================================
// Capabilities
// ============================================================================

pub trait Reactable {
    fn reactions(&self) -> &Reactions;
    fn reactions_mut(&mut self) -> &mut Reactions;
}

pub trait Viewable {
    fn viewers(&self) -> &Viewers;
    fn viewers_mut(&mut self) -> &mut Viewers;

    /// Independent view counter, for entities that track one apart from the
    /// viewer set.
    fn view_counter_mut(&mut self) -> Option<&mut u64> {
        None
    }
}

pub trait Forwardable {
    fn entity_ref(&self) -> EntityRef;
    fn author_id(&self) -> Uuid;
    fn forwardable_content(&self) -> &MessageContent;
    fn forward_stats(&self) -> &ForwardStats;
    fn forward_stats_mut(&mut self) -> &mut ForwardStats;
}
