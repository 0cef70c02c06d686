use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A validated short identifier for a stored mapping.
///
/// Short IDs are exactly 8 characters long and drawn from the URL-safe
/// alphabet `[a-zA-Z0-9_-]`, matching what the random generator produces
/// from 6 bytes of base64 url-safe output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortId(String);

/// Fixed length of every short ID.
pub const SHORT_ID_LENGTH: usize = 8;

impl ShortId {
    /// Creates a new `ShortId` after validating the input.
    pub fn new(id: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Creates a `ShortId` without validation.
    ///
    /// Use this only for IDs produced by trusted internal sources
    /// (e.g. the generators, which always emit valid output).
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the short ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generates the full shortened URL for the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    fn validate(id: &str) -> std::result::Result<(), CoreError> {
        if id.len() != SHORT_ID_LENGTH {
            return Err(CoreError::InvalidShortId(format!(
                "length must be {}, got {}",
                SHORT_ID_LENGTH,
                id.len()
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidShortId(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                id
            )));
        }

        Ok(())
    }
}

impl Display for ShortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
