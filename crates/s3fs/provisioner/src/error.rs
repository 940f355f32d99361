use std::{fmt, time::Duration};

use s3fs_provider::ProviderError;
use strum::Display;
use thiserror::Error;

/// Milestones of a provisioning call.
///
/// A failure is recorded against the last milestone that was reached.
#[derive(Copy, Clone, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum ProvisionState {
    #[default]
    Validating,
    CredentialResolved,
    NamespaceChecked,
    BucketSettled,
    PolicyApplied,
    Complete,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub claim: String,
    pub cluster_id: String,
    pub state: ProvisionState,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", &self.claim, &self.cluster_id)
    }
}

#[derive(Debug, Error)]
#[error("{context}:{kind}")]
pub struct ProvisionError {
    pub context: ErrorContext,
    pub kind: ErrorKind,
}

impl ProvisionError {
    /// Only failures of an external collaborator that it reported as
    /// transient, and deadline expiry, are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn state(&self) -> ProvisionState {
        self.context.state
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Credential(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{message}")]
    ExternalService {
        message: String,
        code: Option<String>,
        retryable: bool,
    },
    #[error("{cause} and cannot delete bucket {bucket}: {rollback}")]
    Compensation {
        bucket: String,
        cause: Box<ErrorKind>,
        rollback: ProviderError,
    },
}

impl ErrorKind {
    pub fn configuration(message: impl fmt::Display) -> Self {
        Self::Configuration(message.to_string())
    }

    pub fn credential(message: impl fmt::Display) -> Self {
        Self::Credential(message.to_string())
    }

    /// Wraps a collaborator failure, keeping its code and transience.
    pub fn external(context: impl fmt::Display, error: ProviderError) -> Self {
        Self::ExternalService {
            message: format!("{context}: {error}"),
            code: error.code,
            retryable: error.transient,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::ExternalService {
            message: format!("deadline exceeded after {timeout:?}"),
            code: None,
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService { retryable, .. } => *retryable,
            Self::Configuration(_)
            | Self::Credential(_)
            | Self::Authorization(_)
            | Self::Compensation { .. } => false,
        }
    }

    /// Joins two independent collaborator failures. The result is retryable
    /// only when both are.
    pub fn combine(self, other: Self) -> Self {
        let code = [&self, &other].into_iter().find_map(|kind| match kind {
            Self::ExternalService { code, .. } => code.clone(),
            _ => None,
        });
        Self::ExternalService {
            message: format!("{self}; {other}"),
            code,
            retryable: self.is_retryable() && other.is_retryable(),
        }
    }
}
