use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Authenticated caller, populated by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Uuid>()
            .copied()
            .map(|id| User { id })
            .ok_or(AppError::Unauthorized)
    }
}

/// Proof that a user belongs to a conversation. A conversation that does not
/// exist is a 404; one the caller merely cannot see is a 403. Both resolve
/// with a single query.
#[derive(Debug, Clone)]
pub struct ConversationMember {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub owner_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct GuardRow {
    owner_id: Option<Uuid>,
    is_member: bool,
}

impl ConversationMember {
    pub async fn verify(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Self> {
        let row = sqlx::query_as::<_, GuardRow>(
            "SELECT c.owner_id, (cm.user_id IS NOT NULL) AS is_member \
             FROM conversations c \
             LEFT JOIN conversation_members cm \
             ON cm.conversation_id = c.id AND cm.user_id = $2 \
             WHERE c.id = $1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("conversation not found".into()))?;

        if !row.is_member {
            return Err(AppError::Forbidden(
                "you are not a participant of this conversation".into(),
            ));
        }
        Ok(Self {
            conversation_id,
            user_id,
            owner_id: row.owner_id,
        })
    }
}

/// Membership plus ownership, for owner-only group operations.
pub struct ConversationOwner {
    pub member: ConversationMember,
}

impl ConversationOwner {
    pub async fn verify(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Self> {
        let member = ConversationMember::verify(db, user_id, conversation_id).await?;
        if member.owner_id != Some(user_id) {
            return Err(AppError::Forbidden(
                "only the owner can manage members".into(),
            ));
        }
        Ok(Self { member })
    }
}
