use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::Level;

/// One span per request with method and path, one completion event with
/// status and latency. Filterable via the `tower_http` target.
pub fn add_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    tracing::info!(
                        status = response.status().as_u16(),
                        elapsed_ms = latency.as_millis() as u64,
                        "request completed"
                    );
                },
            ),
    )
}
