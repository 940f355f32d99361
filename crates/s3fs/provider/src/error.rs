use std::fmt;

use thiserror::Error;

pub type Result<T, E = ProviderError> = ::std::result::Result<T, E>;

/// Machine readable failure codes shared by every adapter.
pub mod codes {
    pub const BUCKET_ALREADY_EXISTS: &str = "BucketAlreadyExists";
    pub const BUCKET_ALREADY_OWNED_BY_YOU: &str = "BucketAlreadyOwnedByYou";
    pub const FORBIDDEN: &str = "Forbidden";
    pub const NO_SUCH_BUCKET: &str = "NoSuchBucket";
    pub const NOT_FOUND: &str = "NotFound";
    pub const UNAVAILABLE: &str = "Unavailable";
    pub const UNSUPPORTED: &str = "Unsupported";
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<String>,
    pub message: String,
    pub transient: bool,
}

impl ProviderError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            code: None,
            message: message.to_string(),
            transient: false,
        }
    }

    pub fn transient(message: impl fmt::Display) -> Self {
        Self {
            transient: true,
            ..Self::new(message)
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub fn is_bucket_already_existing(&self) -> bool {
        self.has_code(codes::BUCKET_ALREADY_EXISTS) || self.has_code(codes::BUCKET_ALREADY_OWNED_BY_YOU)
    }
}

impl From<::anyhow::Error> for ProviderError {
    fn from(error: ::anyhow::Error) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_conflict_codes_mean_existing_bucket() {
        assert!(ProviderError::new("conflict")
            .with_code(codes::BUCKET_ALREADY_EXISTS)
            .is_bucket_already_existing());
        assert!(ProviderError::new("conflict")
            .with_code(codes::BUCKET_ALREADY_OWNED_BY_YOU)
            .is_bucket_already_existing());
        assert!(!ProviderError::transient("timeout").is_bucket_already_existing());
    }
}
