pub mod auth;
pub mod error_handling;
pub mod guards;
pub mod logging;

use axum::Router;

/// Cross-cutting layers every instance of the service carries.
pub fn with_defaults<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    logging::add_tracing(router)
}
