use futures_util::StreamExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::websocket::ConnectionRegistry;

/// Identity of this process on the relay. Frames we published ourselves are
/// skipped on the way back in, so local sockets see each event exactly once
/// while sibling instances still deliver to theirs.
static INSTANCE_ID: Lazy<Uuid> = Lazy::new(Uuid::new_v4);

#[derive(Serialize, Deserialize)]
struct RelayFrame {
    origin: Uuid,
    event: String,
}

fn channel_for_user(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// Publish an already-serialized event to a user's channel so sibling
/// instances can hand it to their local sockets.
pub async fn publish(client: &redis::Client, user_id: Uuid, event: &str) -> AppResult<()> {
    let frame = serde_json::to_string(&RelayFrame {
        origin: *INSTANCE_ID,
        event: event.to_string(),
    })
    .map_err(|_| AppError::Internal)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("PUBLISH")
        .arg(channel_for_user(user_id))
        .arg(frame)
        .query_async::<_, ()>(&mut conn)
        .await?;
    Ok(())
}

/// Subscribe to every user channel and feed relayed frames into the local
/// registry. Runs until the connection drops; the caller is responsible for
/// reconnecting.
pub async fn run_relay_listener(
    client: redis::Client,
    registry: ConnectionRegistry,
) -> AppResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe("user:*").await?;
    tracing::info!(instance = %*INSTANCE_ID, "event relay listener started");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel: String = msg.get_channel_name().to_string();
        let Some(user_id) = channel
            .strip_prefix("user:")
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            continue;
        };
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "undecodable relay payload");
                continue;
            }
        };
        let frame: RelayFrame = match serde_json::from_str(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "malformed relay frame");
                continue;
            }
        };
        if frame.origin == *INSTANCE_ID {
            continue;
        }
        registry
            .broadcast(user_id, axum::extract::ws::Message::Text(frame.event))
            .await;
    }
    Ok(())
}
