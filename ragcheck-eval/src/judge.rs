//! Judge port and the offline lexical judge.
//!
//! A [`Judge`] scores a batch of [`EvaluationRecord`]s and returns, for each
//! metric, one score per record in record order. Scores are in `[0, 1]`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use ragcheck_rag::ProviderErrorKind;

use crate::error::{EvalError, Result};
use crate::report::EvaluationRecord;

pub const CONTEXT_PRECISION: &str = "context_precision";
pub const CONTEXT_RECALL: &str = "context_recall";
pub const FAITHFULNESS: &str = "faithfulness";

/// Metrics every judge must report.
pub const REQUIRED_METRICS: [&str; 3] = [CONTEXT_PRECISION, CONTEXT_RECALL, FAITHFULNESS];

/// Metric name → one score per record.
pub type MetricScores = BTreeMap<String, Vec<f64>>;

/// Scores evaluation records on retrieval and answer quality.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn score(&self, records: &[EvaluationRecord]) -> Result<MetricScores>;

    /// Short name used in logs, errors and reports.
    fn name(&self) -> &str {
        "judge"
    }
}

/// Check that every required metric is present with one score per record.
pub fn validate_scores(judge: &str, scores: &MetricScores, record_count: usize) -> Result<()> {
    for metric in REQUIRED_METRICS {
        let values = scores.get(metric).ok_or_else(|| {
            EvalError::judge(
                judge,
                ProviderErrorKind::InvalidInput,
                format!("missing metric '{metric}'"),
            )
        })?;
        if values.len() != record_count {
            return Err(EvalError::judge(
                judge,
                ProviderErrorKind::InvalidInput,
                format!("metric '{metric}' has {} scores for {record_count} records", values.len()),
            ));
        }
    }
    Ok(())
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "does", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was", "were",
    "what", "which", "who", "will", "with",
];

/// Deterministic judge based on content-word overlap.
///
/// A statement is supported by a text when at least `support_threshold` of
/// the statement's distinct content words occur in the text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalJudge {
    support_threshold: f64,
}

impl Default for LexicalJudge {
    fn default() -> Self {
        Self { support_threshold: 0.5 }
    }
}

impl LexicalJudge {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`EvalError::ConfigError`] unless `0 < threshold <= 1`.
    pub fn with_support_threshold(threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(EvalError::ConfigError(format!(
                "support_threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(Self { support_threshold: threshold })
    }

    pub fn support_threshold(&self) -> f64 {
        self.support_threshold
    }

    fn supports(&self, statement: &HashSet<String>, text: &HashSet<String>) -> bool {
        if statement.is_empty() {
            return false;
        }
        let found = statement.iter().filter(|token| text.contains(*token)).count();
        found as f64 / statement.len() as f64 >= self.support_threshold
    }

    /// Fraction of contexts that support at least one ground-truth statement.
    pub fn context_precision(&self, record: &EvaluationRecord) -> f64 {
        if record.retrieved_contexts.is_empty() {
            return 0.0;
        }
        let statements: Vec<HashSet<String>> =
            ground_truth_sentences(record).map(|s| tokens(&s)).collect();
        let relevant = record
            .retrieved_contexts
            .iter()
            .filter(|context| {
                let context = tokens(context);
                statements.iter().any(|statement| self.supports(statement, &context))
            })
            .count();
        relevant as f64 / record.retrieved_contexts.len() as f64
    }

    /// Fraction of ground-truth sentences supported by the retrieved contexts.
    pub fn context_recall(&self, record: &EvaluationRecord) -> f64 {
        let context = context_tokens(record);
        fraction_supported(ground_truth_sentences(record), |s| self.supports(&tokens(s), &context))
    }

    /// Fraction of answer sentences supported by the retrieved contexts.
    pub fn faithfulness(&self, record: &EvaluationRecord) -> f64 {
        let context = context_tokens(record);
        fraction_supported(sentences(&record.generated_answer), |s| {
            self.supports(&tokens(s), &context)
        })
    }
}

#[async_trait]
impl Judge for LexicalJudge {
    async fn score(&self, records: &[EvaluationRecord]) -> Result<MetricScores> {
        let metric = |f: fn(&Self, &EvaluationRecord) -> f64| -> Vec<f64> {
            records.iter().map(|r| f(self, r)).collect()
        };
        Ok(MetricScores::from([
            (CONTEXT_PRECISION.to_string(), metric(Self::context_precision)),
            (CONTEXT_RECALL.to_string(), metric(Self::context_recall)),
            (FAITHFULNESS.to_string(), metric(Self::faithfulness)),
        ]))
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// Lowercased alphanumeric tokens minus stopwords.
fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Sentences with at least one content word.
fn sentences(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !tokens(s).is_empty())
        .map(str::to_string)
}

fn ground_truth_sentences(record: &EvaluationRecord) -> impl Iterator<Item = String> + '_ {
    record.ground_truth.iter().flat_map(|statement| sentences(statement))
}

fn context_tokens(record: &EvaluationRecord) -> HashSet<String> {
    record.retrieved_contexts.iter().flat_map(|c| tokens(c)).collect()
}

/// 0.0 when there is nothing to check.
fn fraction_supported(
    items: impl Iterator<Item = String>,
    supported: impl Fn(&str) -> bool,
) -> f64 {
    let (total, hits) = items
        .fold((0usize, 0usize), |(total, hits), s| (total + 1, hits + usize::from(supported(&s))));
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}
