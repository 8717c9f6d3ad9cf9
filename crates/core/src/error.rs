use thiserror::Error;

/// Audit trail error types
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Entry not found: {0}")]
    NotFound(i64),

    #[error("Entry {0} is already finalized")]
    AlreadyFinalized(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}
