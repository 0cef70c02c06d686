use crate::{GeneratorError, IdGenerator};
use shrink_core::short_id::SHORT_ID_LENGTH;
use shrink_core::ShortId;

/// A deterministic short ID generator using a sequential counter.
///
/// Produces IDs like "sh000000", "sh000001", padded to the fixed short ID
/// length. Guarantees uniqueness within a single instance, which makes it
/// the generator of choice for tests and single-node deployments where
/// predictable IDs are useful.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: std::sync::atomic::AtomicU64,
    prefix: String,
}

impl SeqGenerator {
    /// Creates a new sequential generator with the given prefix.
    ///
    /// The counter is zero-padded to fill the remaining characters, so the
    /// prefix must be shorter than the short ID length.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        assert!(
            prefix.len() < SHORT_ID_LENGTH,
            "prefix must leave room for the counter"
        );
        Self {
            counter: std::sync::atomic::AtomicU64::new(0),
            prefix,
        }
    }

    /// Creates a sequential generator starting from a specific counter
    /// value, useful for resuming from a known state.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        let generator = Self::with_prefix(prefix);
        generator
            .counter
            .store(offset, std::sync::atomic::Ordering::SeqCst);
        generator
    }
}

impl IdGenerator for SeqGenerator {
    fn generate(&self) -> Result<ShortId, GeneratorError> {
        let count = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let width = SHORT_ID_LENGTH - self.prefix.len();
        Ok(ShortId::new_unchecked(format!(
            "{}{:0width$}",
            self.prefix, count
        )))
    }
}
