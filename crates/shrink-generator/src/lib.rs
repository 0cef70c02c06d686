//! Short ID generators for the shrink URL shortener.
//!
//! Generators are pure: they never talk to storage and make no uniqueness
//! guarantee on their own. Collision handling belongs to the caller, which
//! detects `IdTaken` from the store and retries with a fresh ID.

pub mod random;
pub mod seq;

use shrink_core::ShortId;
use thiserror::Error;

pub use random::RandomIdGenerator;
pub use seq::SeqGenerator;

#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// The underlying randomness source failed. Fatal for the single
    /// request only, not for the process.
    #[error("random source failed: {0}")]
    RandomSource(String),
}

/// Trait for generating short IDs.
///
/// Implementations can vary from random generators to sequential or
/// distributed ID schemes, as long as they emit fixed-length URL-safe
/// identifiers.
pub trait IdGenerator: Send + Sync + 'static {
    /// Produces the next short ID.
    fn generate(&self) -> Result<ShortId, GeneratorError>;
}
