use ::uuid::Builder;
use rand::{rngs::OsRng, RngCore};

use crate::error::{ProviderError, Result};

pub trait UuidGenerator: Send + Sync {
    /// Returns a hyphenated RFC 4122 version 4 UUID.
    fn generate(&self) -> Result<String>;
}

/// Draws entropy from the operating system and fails instead of falling back
/// to a weaker source.
#[derive(Copy, Clone, Debug, Default)]
pub struct OsUuidGenerator;

impl UuidGenerator for OsUuidGenerator {
    fn generate(&self) -> Result<String> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|error| ProviderError::new(format!("failed to read entropy: {error}")))?;
        Ok(Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string())
    }
}
