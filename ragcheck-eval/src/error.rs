//! Error types for the `ragcheck-eval` crate.

use std::time::Duration;

use ragcheck_rag::{ProviderErrorKind, RagError, RetryableError};
use thiserror::Error;

/// Errors that can occur while loading question sets or evaluating answers.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Retrieving contexts for a question failed.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RagError),

    /// The answer generator failed.
    #[error("Generation error ({generator}, {kind}): {message}")]
    GenerationError { generator: String, kind: ProviderErrorKind, message: String },

    /// The judge failed or returned unusable scores.
    #[error("Judge error ({judge}, {kind}): {message}")]
    JudgeError { judge: String, kind: ProviderErrorKind, message: String },

    /// A question set could not be parsed or is invalid.
    #[error("Dataset error: {0}")]
    DatasetError(String),

    /// Invalid evaluator configuration. Raised before any question runs.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub fn generation(
        generator: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::GenerationError { generator: generator.into(), kind, message: message.into() }
    }

    pub fn judge(
        judge: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::JudgeError { judge: judge.into(), kind, message: message.into() }
    }

    /// The provider failure kind, if this error came from an external call.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Retrieval(e) => e.provider_kind(),
            Self::GenerationError { kind, .. } | Self::JudgeError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl RetryableError for EvalError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Retrieval(e) => e.is_retryable(),
            Self::GenerationError { kind, .. } | Self::JudgeError { kind, .. } => {
                kind.is_retryable()
            }
            _ => false,
        }
    }

    /// Timeouts from `with_retry` are attributed to the operation name,
    /// which the evaluator sets to the generator or judge name.
    fn timed_out(operation: &str, after: Duration) -> Self {
        Self::generation(
            operation,
            ProviderErrorKind::Timeout,
            format!("no response after {} ms", after.as_millis()),
        )
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
