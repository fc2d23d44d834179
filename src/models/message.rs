use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::encryption::EncryptionService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    File,
    Image,
}

impl MessageKind {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "text" => Ok(MessageKind::Text),
            "file" => Ok(MessageKind::File),
            "image" => Ok(MessageKind::Image),
            other => Err(AppError::Unsupported(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::Image => "image",
        }
    }
}

/// Row in `messages`. body holds the sealed text for kind = 'text'; the only
/// columns ever mutated after insert are delivered_at and read_at.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub client_msg_id: String,
    pub kind: String,
    pub body: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Wire conversion. Opens the sealed body; attachment fields pass
    /// through untouched.
    pub fn into_dto(self, crypto: &EncryptionService) -> MessageDto {
        MessageDto {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            client_msg_id: self.client_msg_id,
            kind: self.kind,
            text: self.body.map(|b| crypto.open(&b)),
            file_url: self.file_url,
            file_name: self.file_name,
            file_mime: self.file_mime,
            file_size: self.file_size,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            read_at: self.read_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub client_msg_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}
