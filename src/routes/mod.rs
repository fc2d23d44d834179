pub mod conversations;
pub mod groups;
pub mod messages;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;

use crate::metrics;
use crate::middleware::{self, auth};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

/// Assemble the full surface: bearer-gated REST API under /api/v1, the
/// websocket endpoint (which authenticates in-band), and the unauthenticated
/// introspection routes.
pub fn build_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/groups",
            post(groups::create_group_conversation),
        )
        .route(
            "/conversations/:conversation_id/members",
            post(groups::add_members),
        )
        .route(
            "/conversations/:conversation_id/messages",
            get(messages::get_message_history).post(messages::send_message),
        )
        .route(
            "/conversations/:conversation_id/read",
            post(messages::mark_as_read),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let router = Router::new()
        .merge(introspection)
        .nest("/api/v1", api_v1)
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn(metrics::track_http_metrics));

    middleware::with_defaults(router).with_state(state)
}
