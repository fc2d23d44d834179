use std::sync::Arc;
use std::time::Duration;

use chat_service::config::Config;
use chat_service::db;
use chat_service::error::AppError;
use chat_service::logging;
use chat_service::routes::build_router;
use chat_service::services::encryption::EncryptionService;
use chat_service::state::AppState;
use chat_service::websocket::{pubsub, ConnectionRegistry};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Config::from_env()?;
    let db = db::init_pool(&config.database_url).await?;
    db::MIGRATOR
        .run(&db)
        .await
        .map_err(|e| AppError::StartServer(format!("migrations failed: {e}")))?;

    let redis = redis::Client::open(config.redis_url.clone())?;
    let registry = ConnectionRegistry::new();
    let encryption = EncryptionService::new(config.encryption_master_key);

    let state = AppState {
        db,
        redis: redis.clone(),
        registry: registry.clone(),
        config: Arc::new(config),
        encryption: Arc::new(encryption),
    };

    // Cross-instance relay with reconnect. While Redis is unreachable the
    // service keeps running and fan-out stays local to this instance.
    {
        let redis = redis.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = pubsub::run_relay_listener(redis.clone(), registry.clone()).await {
                    tracing::warn!(error = %e, "relay listener stopped, reconnecting in 5s");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "chat service listening");

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    Ok(())
}
