use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::guards::{ConversationOwner, User};
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

/// POST /api/v1/conversations/groups
pub async fn create_group_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateGroupRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let name = body.name.as_deref().unwrap_or_default();
    let conversation =
        ConversationService::create_group(&state.db, user.id, name, &body.member_ids).await?;
    let summary =
        ConversationService::summarize(&state.db, &state.encryption, conversation, user.id)
            .await?;
    Ok((StatusCode::CREATED, Json(json!({ "conversation": summary }))))
}

#[derive(Debug, Deserialize)]
pub struct AddMembersRequest {
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

/// POST /api/v1/conversations/{id}/members
///
/// Owner-only. Direct conversations have no owner, so they are rejected by
/// the ownership guard. Responds with the refreshed member list.
pub async fn add_members(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AddMembersRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ConversationOwner::verify(&state.db, user.id, conversation_id).await?;
    let members =
        ConversationService::add_members(&state.db, conversation_id, &body.member_ids).await?;
    Ok(Json(json!({ "members": members })))
}
