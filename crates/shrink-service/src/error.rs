use crate::pipeline::EnqueueError;
use shrink_core::CoreError;
use shrink_generator::GeneratorError;
use thiserror::Error;

/// Errors surfaced by the registry service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The URL is already shortened. Carries the full existing short URL
    /// so callers can hand it to the client instead of failing.
    #[error("url already shortened: {existing_url}")]
    Conflict { existing_url: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short id: {0}")]
    InvalidShortId(String),
    #[error("short id not found")]
    NotFound,
    #[error("short id has been deleted")]
    Gone,
    /// The deletion queue is saturated. Transient; clients should retry
    /// later. The service never retries internally.
    #[error("deletion queue is full, try again later")]
    QueueFull,
    #[error("deletion pipeline is closed")]
    PipelineClosed,
    /// Every generation attempt hit an occupied short ID.
    #[error("could not allocate an unused short id")]
    IdSpaceExhausted,
    #[error("id generation failed: {0}")]
    Generator(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CoreError> for ServiceError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortId(message) => Self::InvalidShortId(message),
        }
    }
}

impl From<GeneratorError> for ServiceError {
    fn from(value: GeneratorError) -> Self {
        Self::Generator(value.to_string())
    }
}

impl From<EnqueueError> for ServiceError {
    fn from(value: EnqueueError) -> Self {
        match value {
            EnqueueError::QueueFull => Self::QueueFull,
            EnqueueError::Closed => Self::PipelineClosed,
        }
    }
}
