use thiserror::Error;
use warden_core::audit::AuditError;

pub mod audit;

pub use audit::SqlAuditSink;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for AuditError {
    fn from(error: RepositoryError) -> Self {
        AuditError::Storage(error.to_string())
    }
}
