use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::{ConversationMember, User};
use crate::models::MessageDto;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::{MessageService, NewMessage, HISTORY_DEFAULT_LIMIT};
use crate::services::receipt_service::ReceiptService;
use crate::state::AppState;
use crate::websocket::events::{dispatch_to_user, WsOutboundEvent};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/v1/conversations/{id}/messages
///
/// Newest-first page. `before` is an exclusive RFC 3339 cursor; clients feed
/// `next_cursor` straight back to walk the history.
pub async fn get_message_history(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<serde_json::Value>> {
    ConversationMember::verify(&state.db, user.id, conversation_id).await?;
    let before = match query.before.as_deref() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| AppError::BadRequest("invalid 'before' timestamp".into()))?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(HISTORY_DEFAULT_LIMIT);
    let (messages, next_cursor) =
        MessageService::history(&state.db, conversation_id, before, limit).await?;
    let items: Vec<MessageDto> = messages
        .into_iter()
        .map(|m| m.into_dto(&state.encryption))
        .collect();
    Ok(Json(json!({ "items": items, "next_cursor": next_cursor })))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub client_msg_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
    pub file_size: Option<i64>,
}

/// POST /api/v1/conversations/{id}/messages
///
/// Append with the same idempotency and fan-out semantics as the socket
/// path: 201 with events on a fresh row, 200 and silence on a replay.
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    ConversationMember::verify(&state.db, user.id, conversation_id).await?;
    let new = NewMessage::validate(
        body.client_msg_id,
        body.kind,
        body.text,
        body.file_url,
        body.file_name,
        body.file_mime,
        body.file_size,
    )?;
    let outcome =
        MessageService::append(&state.db, &state.encryption, conversation_id, user.id, new)
            .await?;
    let created = outcome.created;
    let dto = outcome.message.into_dto(&state.encryption);

    if created {
        let ack = WsOutboundEvent::MessageAck {
            client_msg_id: dto.client_msg_id.clone(),
            message: dto.clone(),
        };
        dispatch_to_user(&state.registry, &state.redis, user.id, &ack).await;

        let recipients = ConversationService::participant_ids(&state.db, conversation_id).await?;
        let event = WsOutboundEvent::MessageNew {
            message: dto.clone(),
        };
        for recipient in recipients.into_iter().filter(|id| *id != user.id) {
            dispatch_to_user(&state.registry, &state.redis, recipient, &event).await;
        }
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "message": dto }))))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub last_read_message_id: Uuid,
    pub read_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/conversations/{id}/read
///
/// Advance the caller's read watermark up to a target message and notify the
/// target's sender with the refreshed receipt state.
pub async fn mark_as_read(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<MarkReadRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ConversationMember::verify(&state.db, user.id, conversation_id).await?;
    let read_at = body.read_at.unwrap_or_else(Utc::now);
    let receipt = ReceiptService::mark_read_up_to(
        &state.db,
        conversation_id,
        user.id,
        body.last_read_message_id,
        read_at,
    )
    .await?;

    let status = WsOutboundEvent::MessageStatus {
        conversation_id,
        message_id: receipt.target.id,
        delivered_at: receipt.target.delivered_at,
        read_at: receipt.target.read_at,
    };
    dispatch_to_user(
        &state.registry,
        &state.redis,
        receipt.target.sender_id,
        &status,
    )
    .await;

    Ok(Json(json!({ "updated": receipt.updated })))
}
