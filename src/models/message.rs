use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::engagement::{ForwardInfo, ForwardStats, Reactions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Voice,
    Poll,
    Stickers,
}

impl ContentKind {
    /// Kinds that carry an attachment and fall under `can_send_media`.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::File | Self::Voice | Self::Stickers
        )
    }
}

/// Permission-relevant category of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Photo,
    Video,
    Other,
}

/// Content payload shared by messages, channel posts and stories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub kind: ContentKind,
    #[serde(default)]
    pub text: Option<String>,
    /// Resolved media store reference
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            text: Some(text.into()),
            media_url: None,
            file_name: None,
            file_size: None,
            duration_secs: None,
            mime_type: None,
        }
    }

    pub fn media(kind: ContentKind, url: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            kind,
            text: None,
            media_url: Some(url.into()),
            file_name: None,
            file_size: None,
            duration_secs: None,
            mime_type: mime_type.map(str::to_string),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.text = Some(caption.into());
        self
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_media(&self) -> bool {
        self.media_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_text() && !self.has_media()
    }

    /// Category derived from the MIME type, falling back to the content kind
    /// when the type is absent or unparseable.
    pub fn media_category(&self) -> MediaCategory {
        if let Some(parsed) = self
            .mime_type
            .as_deref()
            .and_then(|m| m.parse::<mime::Mime>().ok())
        {
            if parsed.type_() == mime::IMAGE {
                return MediaCategory::Photo;
            }
            if parsed.type_() == mime::VIDEO {
                return MediaCategory::Video;
            }
            return MediaCategory::Other;
        }
        match self.kind {
            ContentKind::Image => MediaCategory::Photo,
            ContentKind::Video => MediaCategory::Video,
            _ => MediaCategory::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    /// Store-assigned monotonic sequence, the pagination key
    pub seq: i64,
    pub content: MessageContent,
    pub reply_to: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub forward: Option<ForwardInfo>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub read_by: BTreeSet<Uuid>,
    pub reactions: Reactions,
    pub forward_stats: ForwardStats,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn from_new(new: NewMessage, seq: i64) -> Self {
        Self {
            id: new.id,
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            seq,
            content: new.content,
            reply_to: new.reply_to,
            topic_id: new.topic_id,
            forward: new.forward,
            is_edited: false,
            is_deleted: false,
            // Sender has implicitly read their own message
            read_by: [new.sender_id].into_iter().collect(),
            reactions: Reactions::default(),
            forward_stats: ForwardStats::default(),
            created_at: new.created_at,
            edited_at: None,
        }
    }

    /// Logical deletion: content cleared, row retained for ordering.
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content.text = None;
        self.content.media_url = None;
        self.content.file_name = None;
        self.content.file_size = None;
        self.content.duration_secs = None;
        self.content.mime_type = None;
    }

    pub fn apply_edit(&mut self, text: String, at: DateTime<Utc>) {
        self.content.text = Some(text);
        self.is_edited = true;
        self.edited_at = Some(at);
    }
}

/// Insert request for a message; the store assigns `seq`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: MessageContent,
    pub reply_to: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub forward: Option<ForwardInfo>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(chat_id: Uuid, sender_id: Uuid, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            sender_id,
            content,
            reply_to: None,
            topic_id: None,
            forward: None,
            created_at: Utc::now(),
        }
    }
}
