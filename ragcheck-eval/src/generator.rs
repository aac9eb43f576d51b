//! Answer generation port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Answer used when no generator is configured and nothing was retrieved.
pub const NO_CONTEXT_ANSWER: &str = "No context retrieved.";

/// Produces an answer to a question from retrieved contexts.
///
/// Failures should be reported as
/// [`EvalError::GenerationError`](crate::EvalError::GenerationError) with a
/// [`ProviderErrorKind`](ragcheck_rag::ProviderErrorKind) so the evaluator
/// can decide whether to retry.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String>;

    /// Short name used in logs, errors and reports.
    fn name(&self) -> &str {
        "generator"
    }
}

/// Where an evaluated answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Produced by an [`AnswerGenerator`].
    Generated,
    /// The retrieved contexts themselves, joined by newlines.
    ContextProxy,
}

/// The stand-in answer used when no generator is configured.
pub fn context_proxy_answer(contexts: &[String]) -> String {
    if contexts.is_empty() { NO_CONTEXT_ANSWER.to_string() } else { contexts.join("\n") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_answer_joins_contexts() {
        let contexts = vec!["first".to_string(), "second".to_string()];
        assert_eq!(context_proxy_answer(&contexts), "first\nsecond");
        assert_eq!(context_proxy_answer(&[]), NO_CONTEXT_ANSWER);
    }

    #[test]
    fn answer_source_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AnswerSource::ContextProxy).unwrap(),
            "\"context_proxy\""
        );
    }
}
