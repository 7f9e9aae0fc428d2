use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Channel,
}

impl ChatKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }
}

/// A conversation thread.
///
/// For group-backed chats `participants` mirrors group membership as of the
/// last group update; the linked [`crate::models::Group`] stays the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub kind: ChatKind,
    pub participants: BTreeSet<Uuid>,
    pub group_id: Option<Uuid>,
    pub last_message_id: Option<Uuid>,
    pub pinned: bool,
    pub muted: bool,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new_private(a: Uuid, b: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ChatKind::Private,
            participants: [a, b].into_iter().collect(),
            group_id: None,
            last_message_id: None,
            pinned: false,
            muted: false,
            created_at: Utc::now(),
        }
    }

    pub fn new_group(group_id: Uuid, members: BTreeSet<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ChatKind::Group,
            participants: members,
            group_id: Some(group_id),
            last_message_id: None,
            pinned: false,
            muted: false,
            created_at: Utc::now(),
        }
    }

    /// Order-independent key identifying a private participant pair.
    pub fn pair_key(a: Uuid, b: Uuid) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}:{hi}")
    }

    /// Pair key for private chats, `None` for every other kind.
    pub fn private_pair_key(&self) -> Option<String> {
        if self.kind != ChatKind::Private || self.participants.len() != 2 {
            return None;
        }
        let mut it = self.participants.iter();
        match (it.next(), it.next()) {
            (Some(a), Some(b)) => Some(Self::pair_key(*a, *b)),
            _ => None,
        }
    }

    pub fn is_group_backed(&self) -> bool {
        self.group_id.is_some()
    }
}
