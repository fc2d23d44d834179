use serde::Serialize;
use uuid::Uuid;

/// Identity block embedded in conversation summaries and member lists.
/// Rows in `users` are provisioned by the identity issuer; this service
/// only reads them.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}
