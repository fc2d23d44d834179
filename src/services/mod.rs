pub mod conversation_service;
pub mod encryption;
pub mod message_service;
pub mod receipt_service;

/// True when a sqlx error is a unique-constraint violation, the signal the
/// optimistic-insert paths turn into a reselect instead of a caller error.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.kind() == sqlx::error::ErrorKind::UniqueViolation)
        .unwrap_or(false)
}
