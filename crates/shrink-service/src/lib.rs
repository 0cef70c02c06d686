//! Registry service for the shrink URL shortener.
//!
//! This crate orchestrates ID generation and store writes for single and
//! batch shorten operations, exposes expand/lookup, and owns the
//! asynchronous batched deletion pipeline.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;

pub use config::{ServiceConfig, StorageBackend};
pub use error::ServiceError;
pub use pipeline::{DeletePipeline, DeleteRequest, EnqueueError, PipelineSettings};
pub use service::{BatchShortenRequest, BatchShortenResponse, UrlService, UserUrl};
