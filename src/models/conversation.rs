use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::message::MessageDto;
use super::user::UserProfile;

pub const KIND_DIRECT: &str = "direct";
pub const KIND_GROUP: &str = "group";

/// Normalize a participant pair into storage order. Both initiators of the
/// same direct conversation end up targeting the same (user_low, user_high)
/// row, which the partial unique index then collapses to one.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Row in `conversations`. Direct rows carry the canonical participant pair,
/// group rows carry name and owner; the CHECK constraints keep the shapes
/// disjoint.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: String,
    pub name: Option<String>,
    pub owner_id: Option<Uuid>,
    pub user_low: Option<Uuid>,
    pub user_high: Option<Uuid>,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_group(&self) -> bool {
        self.kind == KIND_GROUP
    }

    /// The other participant of a direct conversation. None for groups and
    /// for viewers that are not part of the pair.
    pub fn peer_of(&self, viewer: Uuid) -> Option<Uuid> {
        match (self.user_low, self.user_high) {
            (Some(low), Some(high)) if low == viewer => Some(high),
            (Some(low), Some(high)) if high == viewer => Some(low),
            _ => None,
        }
    }
}

/// List-view shape: identity block, cached last message, unread count.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<UserProfile>>,
    pub last_message: Option<MessageDto>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}
