use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{canonical_pair, Conversation, ConversationSummary, Message, UserProfile};
use crate::services::encryption::EncryptionService;
use crate::services::is_unique_violation;

pub struct ConversationService;

impl ConversationService {
    /// Create-or-fetch for direct conversations. Concurrent first-time calls
    /// from both participants converge on one row: the insert races against
    /// the partial unique index and the loser reselects the winner.
    pub async fn resolve_or_create_direct(
        db: &Pool<Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<(Conversation, bool)> {
        if a == b {
            return Err(AppError::BadRequest(
                "cannot open a conversation with yourself".into(),
            ));
        }
        let (low, high) = canonical_pair(a, b);
        if let Some(existing) = Self::find_direct(db, low, high).await? {
            return Ok((existing, false));
        }
        match Self::insert_direct(db, low, high).await {
            Ok(created) => Ok((created, true)),
            Err(AppError::Database(e)) if is_unique_violation(&e) => {
                let existing = Self::find_direct(db, low, high)
                    .await?
                    .ok_or(AppError::Internal)?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    async fn find_direct(
        db: &Pool<Postgres>,
        low: Uuid,
        high: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let found = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE kind = 'direct' AND user_low = $1 AND user_high = $2",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(db)
        .await?;
        Ok(found)
    }

    async fn insert_direct(db: &Pool<Postgres>, low: Uuid, high: Uuid) -> AppResult<Conversation> {
        let mut tx = db.begin().await?;
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (id, kind, user_low, user_high) \
             VALUES ($1, 'direct', $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(low)
        .bind(high)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id) \
             VALUES ($1, $2), ($1, $3) ON CONFLICT DO NOTHING",
        )
        .bind(conversation.id)
        .bind(low)
        .bind(high)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(conversation)
    }

    /// All-or-nothing group creation. The owner belongs even when omitted
    /// from the input set; unknown member ids abort with the missing list.
    pub async fn create_group(
        db: &Pool<Postgres>,
        owner: Uuid,
        name: &str,
        member_ids: &[Uuid],
    ) -> AppResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name is required".into()));
        }
        let mut members: Vec<Uuid> = Vec::with_capacity(member_ids.len() + 1);
        members.push(owner);
        for id in member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }
        let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
            .bind(&members)
            .fetch_all(db)
            .await?;
        let missing: Vec<String> = members
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::UserNotFound(format!(
                "users not found: {}",
                missing.join(", ")
            )));
        }

        let mut tx = db.begin().await?;
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (id, kind, name, owner_id) \
             VALUES ($1, 'group', $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id) \
             SELECT $1, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(conversation.id)
        .bind(&members)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(conversation)
    }

    /// Each addition is independently idempotent: duplicates land on the
    /// primary key and are ignored, ids with no user row are skipped.
    pub async fn add_members(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        member_ids: &[Uuid],
    ) -> AppResult<Vec<UserProfile>> {
        if !member_ids.is_empty() {
            let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
                .bind(member_ids)
                .fetch_all(db)
                .await?;
            if !found.is_empty() {
                sqlx::query(
                    "INSERT INTO conversation_members (conversation_id, user_id) \
                     SELECT $1, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
                )
                .bind(conversation_id)
                .bind(&found)
                .execute(db)
                .await?;
            }
        }
        Self::members(db, conversation_id).await
    }

    pub async fn members(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<Vec<UserProfile>> {
        let members = sqlx::query_as::<_, UserProfile>(
            "SELECT u.id, u.username, u.avatar_url FROM conversation_members cm \
             JOIN users u ON u.id = cm.user_id \
             WHERE cm.conversation_id = $1 ORDER BY cm.joined_at",
        )
        .bind(conversation_id)
        .fetch_all(db)
        .await?;
        Ok(members)
    }

    pub async fn participant_ids(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT user_id FROM conversation_members WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(db)
        .await?;
        Ok(ids)
    }

    /// Messages from the other party/parties still unread by anyone. Served
    /// by the partial index on (conversation_id, sender_id) WHERE read_at IS
    /// NULL, so cost tracks the unread set, not the full history.
    pub async fn unread_count(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        viewer: Uuid,
    ) -> AppResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL",
        )
        .bind(conversation_id)
        .bind(viewer)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    pub async fn list_for_user(
        db: &Pool<Postgres>,
        crypto: &EncryptionService,
        viewer: Uuid,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c \
             JOIN conversation_members cm ON cm.conversation_id = c.id \
             WHERE cm.user_id = $1 \
             ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC",
        )
        .bind(viewer)
        .fetch_all(db)
        .await?;

        let mut items = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            items.push(Self::summarize(db, crypto, conversation, viewer).await?);
        }
        Ok(items)
    }

    pub async fn summarize(
        db: &Pool<Postgres>,
        crypto: &EncryptionService,
        conversation: Conversation,
        viewer: Uuid,
    ) -> AppResult<ConversationSummary> {
        let unread_count = Self::unread_count(db, conversation.id, viewer).await?;
        let last_message = match conversation.last_message_id {
            Some(id) => sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
                .bind(id)
                .fetch_optional(db)
                .await?
                .map(|m| m.into_dto(crypto)),
            None => None,
        };
        let (peer, members) = if conversation.is_group() {
            (None, Some(Self::members(db, conversation.id).await?))
        } else {
            let peer = match conversation.peer_of(viewer) {
                Some(peer_id) => Self::fetch_profile(db, peer_id).await?,
                None => None,
            };
            (peer, None)
        };
        Ok(ConversationSummary {
            id: conversation.id,
            kind: conversation.kind,
            name: conversation.name,
            owner_id: conversation.owner_id,
            peer,
            members,
            last_message,
            unread_count,
            created_at: conversation.created_at,
            last_message_at: conversation.last_message_at,
        })
    }

    /// Peer resolution for direct-conversation creation: exactly one of id or
    /// username must be given.
    pub async fn lookup_peer(
        db: &Pool<Postgres>,
        peer_user_id: Option<Uuid>,
        peer_username: Option<&str>,
    ) -> AppResult<UserProfile> {
        match (peer_user_id, peer_username) {
            (Some(id), None) => Self::fetch_profile(db, id)
                .await?
                .ok_or_else(|| AppError::UserNotFound("user not found".into())),
            (None, Some(username)) => {
                let found = sqlx::query_as::<_, UserProfile>(
                    "SELECT id, username, avatar_url FROM users WHERE username = $1",
                )
                .bind(username)
                .fetch_optional(db)
                .await?;
                found.ok_or_else(|| AppError::UserNotFound("user not found".into()))
            }
            _ => Err(AppError::BadRequest(
                "provide either peer_user_id or peer_username".into(),
            )),
        }
    }

    async fn fetch_profile(db: &Pool<Postgres>, id: Uuid) -> AppResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            "SELECT id, username, avatar_url FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }
}
