use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::verify_access_token;
use crate::middleware::guards::ConversationMember;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::{MessageService, NewMessage};
use crate::services::receipt_service::ReceiptService;
use crate::state::AppState;
use crate::websocket::events::{dispatch_to_user, WsInboundEvent, WsOutboundEvent};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // The first meaningful frame must be an auth event; anything else ends
    // the connection after an error frame.
    let user_id = loop {
        let frame = match receiver.next().await {
            Some(Ok(frame)) => frame,
            _ => return,
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<WsInboundEvent>(&text) {
                Ok(WsInboundEvent::Auth { access_token }) => {
                    match verify_access_token(&state.config.jwt_secret, &access_token) {
                        Ok(user_id) => break user_id,
                        Err(e) => {
                            let _ = sender.send(WsOutboundEvent::error_from(&e).to_message()).await;
                            return;
                        }
                    }
                }
                Ok(_) => {
                    let err = WsOutboundEvent::error_from(&AppError::Unauthorized);
                    let _ = sender.send(err.to_message()).await;
                    return;
                }
                Err(_) => {
                    let err = WsOutboundEvent::error_from(&AppError::BadRequest(
                        "invalid event".into(),
                    ));
                    let _ = sender.send(err.to_message()).await;
                    return;
                }
            },
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return,
        }
    };

    // Join the room before acking so a client that reacts to auth:ok can
    // never miss a frame addressed to it.
    let mut room = state.registry.add_subscriber(user_id).await;
    let ok = WsOutboundEvent::AuthOk { user_id };
    if sender.send(ok.to_message()).await.is_err() {
        return;
    }
    tracing::info!(user_id = %user_id, "websocket authenticated");

    // Pump room fan-out and inbound events until either side closes. The
    // registry prunes our sender once this task drops the receiver.
    loop {
        tokio::select! {
            outbound = room.recv() => {
                match outbound {
                    Some(frame) => {
                        if sender.send(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = receiver.next() => {
                let frame = match inbound {
                    Some(Ok(frame)) => frame,
                    _ => break,
                };
                match frame {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<WsInboundEvent>(&text) {
                            Ok(WsInboundEvent::Auth { .. }) => {
                                Some(WsOutboundEvent::error_from(&AppError::BadRequest(
                                    "already authenticated".into(),
                                )))
                            }
                            Ok(event) => handle_event(&state, user_id, event)
                                .await
                                .err()
                                .map(|e| WsOutboundEvent::error_from(&e)),
                            Err(_) => Some(WsOutboundEvent::error_from(&AppError::BadRequest(
                                "invalid event".into(),
                            ))),
                        };
                        if let Some(reply) = reply {
                            if sender.send(reply.to_message()).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    tracing::debug!(user_id = %user_id, "websocket closed");
}

/// Post-auth event dispatch. Errors bubble to the socket loop, which turns
/// them into an error frame without closing the connection.
async fn handle_event(state: &AppState, user_id: Uuid, event: WsInboundEvent) -> AppResult<()> {
    match event {
        // Re-auth is rejected by the socket loop before it gets here.
        WsInboundEvent::Auth { .. } => Ok(()),

        WsInboundEvent::MessageSend {
            conversation_id,
            client_msg_id,
            kind,
            text,
            file_url,
            file_name,
            file_mime,
            file_size,
        } => {
            ConversationMember::verify(&state.db, user_id, conversation_id).await?;
            let new = NewMessage::validate(
                client_msg_id,
                kind,
                text,
                file_url,
                file_name,
                file_mime,
                file_size,
            )?;
            let outcome =
                MessageService::append(&state.db, &state.encryption, conversation_id, user_id, new)
                    .await?;
            let created = outcome.created;
            let dto = outcome.message.into_dto(&state.encryption);

            let ack = WsOutboundEvent::MessageAck {
                client_msg_id: dto.client_msg_id.clone(),
                message: dto.clone(),
            };
            dispatch_to_user(&state.registry, &state.redis, user_id, &ack).await;

            // A replay acked above changed nothing, so nobody else hears it.
            if created {
                let recipients =
                    ConversationService::participant_ids(&state.db, conversation_id).await?;
                let event = WsOutboundEvent::MessageNew { message: dto };
                for recipient in recipients.into_iter().filter(|id| *id != user_id) {
                    dispatch_to_user(&state.registry, &state.redis, recipient, &event).await;
                }
            }
            Ok(())
        }

        WsInboundEvent::MessageDelivered {
            message_id,
            delivered_at,
        } => {
            let delivered_at = delivered_at.unwrap_or_else(Utc::now);
            let updated =
                ReceiptService::mark_delivered(&state.db, message_id, user_id, delivered_at)
                    .await?;
            if let Some(message) = updated {
                let status = WsOutboundEvent::MessageStatus {
                    conversation_id: message.conversation_id,
                    message_id: message.id,
                    delivered_at: message.delivered_at,
                    read_at: message.read_at,
                };
                dispatch_to_user(&state.registry, &state.redis, message.sender_id, &status).await;
            }
            Ok(())
        }

        WsInboundEvent::MessageRead {
            conversation_id,
            last_read_message_id,
            read_at,
        } => {
            ConversationMember::verify(&state.db, user_id, conversation_id).await?;
            let read_at = read_at.unwrap_or_else(Utc::now);
            let receipt = ReceiptService::mark_read_up_to(
                &state.db,
                conversation_id,
                user_id,
                last_read_message_id,
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
            Ok(())
        }
    }
}
