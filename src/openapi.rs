use utoipa::OpenApi;

/// Static API description served at GET /openapi.json.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chat Service API",
        version = "1.0.0",
        description = "Direct and group conversations, idempotent message append, \
                       delivery/read receipts, and the realtime websocket protocol."
    ),
    servers(
        (url = "http://localhost:8085", description = "Local development")
    ),
    tags(
        (name = "health", description = "Liveness and introspection"),
        (name = "conversations", description = "Direct and group conversation management"),
        (name = "messages", description = "Message history, append, and read receipts"),
        (name = "websocket", description = "Realtime event stream at /ws")
    )
)]
pub struct ApiDoc;
