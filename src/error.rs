use axum::http::StatusCode;
use thiserror::Error;

use crate::models::UnknownRole;

/// RepositoryError
///
/// Failures surfaced by any `Repository` implementation. Handlers never inspect the
/// variants directly; they rely on the `StatusCode` conversion below so that `?` works in
/// every `Result<_, StatusCode>` handler.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt row: {0}")]
    Corrupt(#[from] UnknownRole),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for StatusCode {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => {
                tracing::debug!("repository lookup missed: {}", what);
                StatusCode::NOT_FOUND
            }
            RepositoryError::Conflict(msg) => {
                tracing::warn!("repository conflict: {}", msg);
                StatusCode::CONFLICT
            }
            other => {
                // Details stay in the logs; clients only see the status.
                tracing::error!("repository error: {:?}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
