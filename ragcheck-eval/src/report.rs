//! Evaluation records and the run report.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EvalError, Result};
use crate::generator::AnswerSource;

/// Everything the judge needs to score one answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub ground_truth: Vec<String>,
    /// Retrieved chunk texts, best match first.
    pub retrieved_contexts: Vec<String>,
    pub generated_answer: String,
    pub answer_source: AnswerSource,
}

/// Outcome for one question of the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuestionResult {
    Succeeded {
        record: EvaluationRecord,
        /// Metric name → score. Empty when the judge failed.
        scores: BTreeMap<String, f64>,
    },
    Failed {
        question: String,
        ground_truth: Vec<String>,
        error: String,
    },
}

impl QuestionResult {
    pub fn question(&self) -> &str {
        match self {
            Self::Succeeded { record, .. } => &record.question,
            Self::Failed { question, .. } => question,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn record(&self) -> Option<&EvaluationRecord> {
        match self {
            Self::Succeeded { record, .. } => Some(record),
            Self::Failed { .. } => None,
        }
    }

    pub fn scores(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            Self::Succeeded { scores, .. } => Some(scores),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Succeeded { .. } => None,
        }
    }
}

/// The result of one evaluation run.
///
/// `per_question` is in the order the questions were given.
/// `aggregate_scores` averages each metric over succeeded questions only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Name of the judge that scored the run.
    pub judge: String,
    pub answer_source: AnswerSource,
    pub per_question: Vec<QuestionResult>,
    pub aggregate_scores: BTreeMap<String, f64>,
    /// Set when the judge failed; records are kept but carry no scores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_error: Option<String>,
}

impl EvaluationReport {
    pub fn succeeded(&self) -> usize {
        self.per_question.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.per_question.len() - self.succeeded()
    }

    /// Records of succeeded questions, in question order.
    pub fn records(&self) -> impl Iterator<Item = &EvaluationRecord> {
        self.per_question.iter().filter_map(QuestionResult::record)
    }

    pub fn aggregate(&self, metric: &str) -> Option<f64> {
        self.aggregate_scores.get(metric).copied()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EvalError::DatasetError(format!("cannot serialize report: {e}")))
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}
