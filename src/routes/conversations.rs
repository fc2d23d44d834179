use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::guards::User;
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;

/// GET /api/v1/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
) -> AppResult<Json<serde_json::Value>> {
    let items = ConversationService::list_for_user(&state.db, &state.encryption, user.id).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub peer_user_id: Option<Uuid>,
    pub peer_username: Option<String>,
}

/// POST /api/v1/conversations
///
/// Create-or-fetch for a direct conversation with one peer, addressed by id
/// or by username. 201 on first creation, 200 when it already existed.
pub async fn create_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let peer = ConversationService::lookup_peer(
        &state.db,
        body.peer_user_id,
        body.peer_username.as_deref(),
    )
    .await?;
    let (conversation, created) =
        ConversationService::resolve_or_create_direct(&state.db, user.id, peer.id).await?;
    let summary =
        ConversationService::summarize(&state.db, &state.encryption, conversation, user.id)
            .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "conversation": summary }))))
}
