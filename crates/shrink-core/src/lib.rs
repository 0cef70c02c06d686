//! Core types and traits for the shrink URL shortener.
//!
//! This crate provides the shared data model, the storage capability
//! contract and the error taxonomy used by the storage backends and the
//! registry service.

pub mod error;
pub mod short_id;
pub mod store;

pub use error::{CoreError, StoreError};
pub use short_id::ShortId;
pub use store::{OwnedUrl, Pinger, UrlPair, UrlStore};
