use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageKind};
use crate::services::encryption::EncryptionService;
use crate::services::is_unique_violation;

pub const HISTORY_DEFAULT_LIMIT: i64 = 30;
pub const HISTORY_MAX_LIMIT: i64 = 100;

/// Validated append input. Building one through [`NewMessage::validate`]
/// enforces the per-kind field rules before anything touches the database.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub client_msg_id: String,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
    pub file_size: Option<i64>,
}

impl NewMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        client_msg_id: Option<String>,
        kind: Option<String>,
        text: Option<String>,
        file_url: Option<String>,
        file_name: Option<String>,
        file_mime: Option<String>,
        file_size: Option<i64>,
    ) -> AppResult<Self> {
        let client_msg_id = client_msg_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("client_msg_id is required".into()))?;
        let kind_tag = kind
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("type is required".into()))?;
        let kind = MessageKind::parse(&kind_tag)?;
        match kind {
            MessageKind::Text => {
                if text.is_none() {
                    return Err(AppError::BadRequest(
                        "text is required for text messages".into(),
                    ));
                }
                Ok(Self {
                    client_msg_id,
                    kind,
                    text,
                    file_url: None,
                    file_name: None,
                    file_mime: None,
                    file_size: None,
                })
            }
            MessageKind::File | MessageKind::Image => {
                let file_url = file_url
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                let file_name = file_name
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                if file_url.is_none() || file_name.is_none() {
                    return Err(AppError::BadRequest(
                        "file_url and file_name are required for attachments".into(),
                    ));
                }
                Ok(Self {
                    client_msg_id,
                    kind,
                    text: None,
                    file_url,
                    file_name,
                    file_mime,
                    file_size,
                })
            }
        }
    }
}

/// Result of an append: `created` distinguishes a fresh row from an
/// idempotent replay that resolved to an already-stored one.
pub struct AppendOutcome {
    pub message: Message,
    pub created: bool,
}

pub struct MessageService;

impl MessageService {
    /// Append with at-most-once storage per (sender, client_msg_id). The
    /// insert is optimistic; when the uniqueness constraint fires we resolve
    /// to the stored row, or reject with a conflict if that row lives in a
    /// different conversation.
    pub async fn append(
        db: &Pool<Postgres>,
        crypto: &EncryptionService,
        conversation_id: Uuid,
        sender_id: Uuid,
        new: NewMessage,
    ) -> AppResult<AppendOutcome> {
        let body = match &new.text {
            Some(text) => Some(crypto.seal(text)?),
            None => None,
        };
        match Self::insert(db, conversation_id, sender_id, &new, body.as_deref()).await {
            Ok(message) => {
                Self::touch_conversation_cache(db, &message).await?;
                Ok(AppendOutcome {
                    message,
                    created: true,
                })
            }
            Err(AppError::Database(e)) if is_unique_violation(&e) => {
                let existing = Self::find_by_client_token(db, sender_id, &new.client_msg_id)
                    .await?
                    .ok_or(AppError::Internal)?;
                if existing.conversation_id != conversation_id {
                    return Err(AppError::Conflict(
                        "client_msg_id already used in another conversation".into(),
                    ));
                }
                Ok(AppendOutcome {
                    message: existing,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn insert(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        new: &NewMessage,
        body: Option<&str>,
    ) -> AppResult<Message> {
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages \
             (id, conversation_id, sender_id, client_msg_id, kind, body, \
              file_url, file_name, file_mime, file_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(&new.client_msg_id)
        .bind(new.kind.as_str())
        .bind(body)
        .bind(new.file_url.as_deref())
        .bind(new.file_name.as_deref())
        .bind(new.file_mime.as_deref())
        .bind(new.file_size)
        .fetch_one(db)
        .await?;
        Ok(message)
    }

    // Denormalized recency cache on the conversation row. The guard keeps
    // concurrent appends from moving last_message_at backwards.
    async fn touch_conversation_cache(db: &Pool<Postgres>, message: &Message) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations SET last_message_id = $2, last_message_at = $3 \
             WHERE id = $1 AND (last_message_at IS NULL OR last_message_at <= $3)",
        )
        .bind(message.conversation_id)
        .bind(message.id)
        .bind(message.created_at)
        .execute(db)
        .await?;
        Ok(())
    }

    async fn find_by_client_token(
        db: &Pool<Postgres>,
        sender_id: Uuid,
        client_msg_id: &str,
    ) -> AppResult<Option<Message>> {
        let found = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE sender_id = $1 AND client_msg_id = $2",
        )
        .bind(sender_id)
        .bind(client_msg_id)
        .fetch_optional(db)
        .await?;
        Ok(found)
    }

    /// Newest-first keyset page. The cursor only comes back on a full page;
    /// a short page means the history is exhausted.
    pub async fn history(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<(Vec<Message>, Option<DateTime<Utc>>)> {
        let limit = limit.clamp(1, HISTORY_MAX_LIMIT);
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = $1 \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
        )
        .bind(conversation_id)
        .bind(before)
        .bind(limit)
        .fetch_all(db)
        .await?;
        let next_cursor = if messages.len() as i64 == limit {
            messages.last().map(|m| m.created_at)
        } else {
            None
        };
        Ok((messages, next_cursor))
    }
}
