use crate::{GeneratorError, IdGenerator};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::TryRngCore;
use shrink_core::short_id::SHORT_ID_LENGTH;
use shrink_core::ShortId;

/// Number of random bytes per ID. 6 bytes encode to exactly 8 base64
/// characters, the fixed short ID length.
const RANDOM_BYTES: usize = 6;

/// Generates short IDs from the operating system's cryptographically
/// strong random source, encoded with the URL-safe base64 alphabet.
///
/// Collisions are possible (birthday bound over a 48-bit space) and are
/// not detected here; the store's uniqueness check is the arbiter.
#[derive(Debug, Clone, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> Result<ShortId, GeneratorError> {
        let mut bytes = [0u8; RANDOM_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| GeneratorError::RandomSource(e.to_string()))?;

        let encoded = URL_SAFE_NO_PAD.encode(bytes);
        debug_assert_eq!(encoded.len(), SHORT_ID_LENGTH);

        Ok(ShortId::new_unchecked(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_fixed_length_ids() {
        let generator = RandomIdGenerator::new();
        let id = generator.generate().unwrap();
        assert_eq!(id.as_str().len(), SHORT_ID_LENGTH);
    }

    #[test]
    fn generates_url_safe_characters() {
        let generator = RandomIdGenerator::new();
        for _ in 0..100 {
            let id = generator.generate().unwrap();
            assert!(id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn output_validates_as_short_id() {
        let generator = RandomIdGenerator::new();
        let id = generator.generate().unwrap();
        assert!(ShortId::new(id.as_str()).is_ok());
    }

    #[test]
    fn distinct_ids_in_practice() {
        let generator = RandomIdGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = generator.generate().unwrap();
            assert!(seen.insert(id.as_str().to_owned()), "duplicate id generated");
        }
    }
}
