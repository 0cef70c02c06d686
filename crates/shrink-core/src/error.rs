use crate::short_id::ShortId;
use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by the durable store backends.
///
/// `Conflict`, `NotFound` and `Gone` are part of the contract and carry
/// meaning to callers; the remaining variants describe backend failures
/// and are surfaced as generic storage errors by the service layer.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// An un-deleted mapping already holds the same original URL.
    /// Carries the short ID of that mapping so callers can return the
    /// existing short URL instead of an error.
    #[error("url already shortened as '{existing_id}'")]
    Conflict { existing_id: ShortId },
    /// The short ID is already assigned to a different original URL.
    /// Callers are expected to retry with a freshly generated ID.
    #[error("short id is already taken")]
    IdTaken,
    /// No mapping exists for the short ID.
    #[error("short id not found")]
    NotFound,
    /// A mapping exists for the short ID but has been deleted.
    #[error("short id has been deleted")]
    Gone,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short id: {0}")]
    InvalidShortId(String),
}
