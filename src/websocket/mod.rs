pub mod events;
pub mod handlers;
pub mod pubsub;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Per-user rooms on this instance. Every authenticated socket registers a
/// sender under its user id; fan-out clones the frame to each live socket,
/// so multiple devices of the same user all receive it.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, Vec<UnboundedSender<Message>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for a user and hand back the receiving half that
    /// drives it. Dropping the receiver is how a socket leaves the room.
    pub async fn add_subscriber(&self, user_id: Uuid) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.rooms
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver a frame to every live socket of a user. Senders whose
    /// receiving task has gone away are pruned in the same pass.
    pub async fn broadcast(&self, user_id: Uuid, message: Message) {
        let mut rooms = self.rooms.write().await;
        if let Some(senders) = rooms.get_mut(&user_id) {
            senders.retain(|tx| tx.send(message.clone()).is_ok());
            if senders.is_empty() {
                rooms.remove(&user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_socket_of_the_user() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let mut first = registry.add_subscriber(user).await;
        let mut second = registry.add_subscriber(user).await;

        registry
            .broadcast(user, Message::Text("hello".to_string()))
            .await;

        for rx in [&mut first, &mut second] {
            match rx.recv().await {
                Some(Message::Text(text)) => assert_eq!(text, "hello"),
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn dead_sockets_are_pruned_on_broadcast() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let rx = registry.add_subscriber(user).await;
        drop(rx);

        registry
            .broadcast(user, Message::Text("hello".to_string()))
            .await;

        assert!(registry.rooms.read().await.get(&user).is_none());
    }

    #[tokio::test]
    async fn broadcast_to_an_empty_room_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        registry
            .broadcast(Uuid::new_v4(), Message::Text("hello".to_string()))
            .await;
    }
}
