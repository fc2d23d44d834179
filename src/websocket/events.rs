use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::MessageDto;
use crate::websocket::{pubsub, ConnectionRegistry};

/// Client-to-server events. The wire envelope is
/// `{"type": <tag>, "payload": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsInboundEvent {
    #[serde(rename = "auth")]
    Auth { access_token: String },
    #[serde(rename = "message:send")]
    MessageSend {
        conversation_id: Uuid,
        client_msg_id: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        text: Option<String>,
        file_url: Option<String>,
        file_name: Option<String>,
        file_mime: Option<String>,
        file_size: Option<i64>,
    },
    #[serde(rename = "message:delivered")]
    MessageDelivered {
        message_id: Uuid,
        delivered_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "message:read")]
    MessageRead {
        conversation_id: Uuid,
        last_read_message_id: Uuid,
        read_at: Option<DateTime<Utc>>,
    },
}

/// Server-to-client events, same envelope shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsOutboundEvent {
    #[serde(rename = "auth:ok")]
    AuthOk { user_id: Uuid },
    #[serde(rename = "message:new")]
    MessageNew { message: MessageDto },
    #[serde(rename = "message:ack")]
    MessageAck {
        client_msg_id: String,
        message: MessageDto,
    },
    #[serde(rename = "message:status")]
    MessageStatus {
        conversation_id: Uuid,
        message_id: Uuid,
        delivered_at: Option<DateTime<Utc>>,
        read_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl WsOutboundEvent {
    pub fn error_from(err: &AppError) -> Self {
        Self::Error {
            code: err.error_code().to_string(),
            message: err.public_message(),
        }
    }

    pub fn to_message(&self) -> Message {
        // These enums serialize infallibly; the fallback frame exists so a
        // future non-serializable payload degrades instead of panicking.
        let payload = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","payload":{"code":"internal_error","message":"Internal server error"}}"#
                .to_string()
        });
        Message::Text(payload)
    }
}

/// Fan an event out to one user: local sockets synchronously through the
/// registry, sibling instances through the relay. A relay failure degrades
/// to single-instance delivery rather than failing the operation.
pub async fn dispatch_to_user(
    registry: &ConnectionRegistry,
    redis: &redis::Client,
    user_id: Uuid,
    event: &WsOutboundEvent,
) {
    let Message::Text(payload) = event.to_message() else {
        return;
    };
    registry
        .broadcast(user_id, Message::Text(payload.clone()))
        .await;
    if let Err(e) = pubsub::publish(redis, user_id, &payload).await {
        tracing::debug!(user_id = %user_id, error = %e, "relay publish failed, delivery stays local");
    }
}
