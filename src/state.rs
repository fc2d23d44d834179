use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::services::encryption::EncryptionService;
use crate::websocket::ConnectionRegistry;

/// Shared handles cloned into every request handler and socket task.
#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub redis: redis::Client,
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
    pub encryption: Arc<EncryptionService>,
}
