use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Message;

/// Outcome of a read watermark: the target row refreshed after the update,
/// plus how many rows the watermark actually transitioned.
pub struct ReadReceipt {
    pub target: Message,
    pub updated: u64,
}

pub struct ReceiptService;

impl ReceiptService {
    /// First writer wins. `Ok(Some(_))` carries the refreshed row on the
    /// unset-to-set transition; `Ok(None)` means the receipt was already
    /// recorded and nothing changed.
    ///
    /// Membership is checked here because callers only hold a message id,
    /// not the owning conversation.
    pub async fn mark_delivered(
        db: &Pool<Postgres>,
        message_id: Uuid,
        viewer: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| AppError::NotFound("message not found".into()))?;

        let is_member: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM conversation_members \
             WHERE conversation_id = $1 AND user_id = $2)",
        )
        .bind(message.conversation_id)
        .bind(viewer)
        .fetch_one(db)
        .await?;
        if !is_member {
            return Err(AppError::Forbidden(
                "you are not a participant of this conversation".into(),
            ));
        }

        let updated = sqlx::query_as::<_, Message>(
            "UPDATE messages SET delivered_at = $2 \
             WHERE id = $1 AND delivered_at IS NULL RETURNING *",
        )
        .bind(message_id)
        .bind(delivered_at)
        .fetch_optional(db)
        .await?;
        Ok(updated)
    }

    /// Bulk read watermark: every unread row in the conversation from other
    /// senders with created_at at or before the target's becomes read in one
    /// statement. Replays match zero rows and report `updated == 0`.
    ///
    /// Callers verify membership before invoking this.
    pub async fn mark_read_up_to(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        reader: Uuid,
        target_message_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> AppResult<ReadReceipt> {
        let target = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE id = $1 AND conversation_id = $2",
        )
        .bind(target_message_id)
        .bind(conversation_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("message not found in this conversation".into()))?;

        let result = sqlx::query(
            "UPDATE messages SET read_at = $4 \
             WHERE conversation_id = $1 AND sender_id <> $2 \
             AND created_at <= $3 AND read_at IS NULL",
        )
        .bind(conversation_id)
        .bind(reader)
        .bind(target.created_at)
        .bind(read_at)
        .execute(db)
        .await?;

        // Refetch so the status event carries the post-update timestamps.
        let target = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(target.id)
            .fetch_one(db)
            .await?;
        Ok(ReadReceipt {
            target,
            updated: result.rows_affected(),
        })
    }
}
