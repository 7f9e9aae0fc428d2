pub mod channel;
pub mod conversation;
pub mod engagement;
pub mod group;
pub mod member;
pub mod message;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export for convenience
pub use channel::{Channel, ChannelPost, Story};
pub use conversation::{Chat, ChatKind};
pub use engagement::{
    EntityKind, EntityRef, ForwardInfo, ForwardOrigin, ForwardStats, ForwardTarget,
    ForwardTargetKind, Forwardable, Reactable, Reaction, ReactionOutcome, Reactions,
    ViewOutcome, ViewRecord, Viewable, Viewers,
};
pub use group::{Group, GroupSettings, MemberException};
pub use member::MemberRole;
pub use message::{ContentKind, MediaCategory, Message, MessageContent, NewMessage};

/// Public identity of a sender, joined into outbound messages.
///
/// Profiles are owned by the external profile CRUD; the engine only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl SenderProfile {
    pub fn bare(id: Uuid) -> Self {
        Self {
            id,
            display_name: None,
            avatar_url: None,
        }
    }
}

/// Message with its sender identity joined in, as delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydratedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub sender: SenderProfile,
}
