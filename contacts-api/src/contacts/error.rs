use rocket_db_pools::sqlx;
use thiserror::Error;
use uuid::Uuid;

pub type ImportResult<T> = Result<T, ImportError>;

/// Failures raised by a [`ContactRepository`](super::ContactRepository).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("contact {0} not found")]
    ContactNotFound(Uuid),
    #[error("attribute key '{0}' is not defined for this environment")]
    UnknownAttributeKey(String),
}

/// Batch rejected before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no records supplied")]
    EmptyBatch,
    #[error("too many records: {count} supplied, at most {max} allowed")]
    TooManyRecords { count: usize, max: usize },
    #[error("record {row} contains an empty column name")]
    EmptyColumnName { row: usize },
    #[error("attribute map entry for column '{column}' has an empty key")]
    EmptyAttributeKey { column: String },
    #[error("columns '{first}' and '{second}' both map to attribute key '{key}'")]
    ConflictingAttributeMapping {
        key: String,
        first: String,
        second: String,
    },
    #[error("duplicate email in records: {0}")]
    DuplicateEmail(String),
    #[error("duplicate userId in records: {0}")]
    DuplicateUserId(String),
    #[error("userId {0} already exists in this environment")]
    UserIdExists(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
