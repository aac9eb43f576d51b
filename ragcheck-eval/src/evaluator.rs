//! The evaluation run: retrieve, answer, judge, aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use ragcheck_rag::{RetryPolicy, Retriever, with_retry};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dataset::EvalQuestion;
use crate::error::{EvalError, Result};
use crate::generator::{AnswerGenerator, AnswerSource, context_proxy_answer};
use crate::judge::{Judge, MetricScores, validate_scores};
use crate::report::{EvaluationRecord, EvaluationReport, QuestionResult};

/// Settings for an [`Evaluator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Collection the questions are answered from.
    pub collection: String,
    /// Contexts retrieved per question.
    pub top_k: usize,
    /// Questions processed at the same time.
    pub max_concurrent_questions: usize,
    /// Timeout and retry settings for generator and judge calls.
    pub retry: RetryPolicy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            collection: "company_documents".to_string(),
            top_k: 3,
            max_concurrent_questions: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl EvaluatorConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), ..Self::default() }
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_max_concurrent_questions(mut self, max: usize) -> Self {
        self.max_concurrent_questions = max;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(EvalError::ConfigError("collection must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(EvalError::ConfigError("top_k must be greater than zero".into()));
        }
        if self.max_concurrent_questions == 0 {
            return Err(EvalError::ConfigError(
                "max_concurrent_questions must be greater than zero".into(),
            ));
        }
        self.retry.validate().map_err(|e| EvalError::ConfigError(e.to_string()))
    }
}

/// Runs a question set against a collection and scores the answers.
///
/// Construct one via [`Evaluator::builder()`].
///
/// # Example
///
/// ```rust,ignore
/// use ragcheck_eval::{Evaluator, EvaluatorConfig, LexicalJudge, QuestionSet};
///
/// let evaluator = Evaluator::builder()
///     .retriever(Arc::new(retriever))
///     .judge(Arc::new(LexicalJudge::new()))
///     .config(EvaluatorConfig::new("company_documents"))
///     .build()?;
///
/// let questions = QuestionSet::from_path("questions.json")?;
/// let report = evaluator.evaluate(questions.questions()).await?;
/// ```
pub struct Evaluator {
    retriever: Arc<Retriever>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    judge: Arc<dyn Judge>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::default()
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn answer_source(&self) -> AnswerSource {
        if self.generator.is_some() { AnswerSource::Generated } else { AnswerSource::ContextProxy }
    }

    /// Evaluate `questions` and build the report.
    ///
    /// A failing question is recorded as failed and the run continues. A
    /// failing judge leaves every record unscored and sets
    /// [`EvaluationReport::judge_error`]. Results are in input order.
    pub async fn evaluate(&self, questions: &[EvalQuestion]) -> Result<EvaluationReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            collection = %self.config.collection,
            questions = questions.len(),
            judge = self.judge.name(),
            "evaluation started"
        );

        let mut outcomes: Vec<(usize, Result<EvaluationRecord>)> =
            stream::iter(questions.iter().enumerate())
                .map(|(position, question)| async move {
                    (position, self.answer(question).await)
                })
                .buffer_unordered(self.config.max_concurrent_questions)
                .collect()
                .await;
        outcomes.sort_by_key(|(position, _)| *position);

        let mut per_question = Vec::with_capacity(outcomes.len());
        let mut records = Vec::new();
        for ((_, outcome), question) in outcomes.into_iter().zip(questions) {
            match outcome {
                Ok(record) => {
                    records.push(record.clone());
                    per_question.push(QuestionResult::Succeeded { record, scores: BTreeMap::new() });
                }
                Err(e) => {
                    warn!(%run_id, question = %question.question, error = %e, "question failed");
                    per_question.push(QuestionResult::Failed {
                        question: question.question.clone(),
                        ground_truth: question.ground_truth.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut aggregate_scores = BTreeMap::new();
        let mut judge_error = None;
        if !records.is_empty() {
            match self.judge_records(&records).await {
                Ok(scores) => {
                    attach_scores(&mut per_question, &scores);
                    aggregate_scores = aggregate(&scores);
                }
                Err(e) => {
                    error!(%run_id, judge = self.judge.name(), error = %e, "judge failed");
                    judge_error = Some(e.to_string());
                }
            }
        }

        let report = EvaluationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            judge: self.judge.name().to_string(),
            answer_source: self.answer_source(),
            per_question,
            aggregate_scores,
            judge_error,
        };
        info!(
            %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            scores = ?report.aggregate_scores,
            "evaluation finished"
        );
        Ok(report)
    }

    async fn answer(&self, question: &EvalQuestion) -> Result<EvaluationRecord> {
        let contexts = self
            .retriever
            .retrieve(&self.config.collection, &question.question, self.config.top_k)
            .await?;

        let (generated_answer, answer_source) = match &self.generator {
            Some(generator) => {
                let answer = with_retry(&self.config.retry, generator.name(), || {
                    generator.generate(&question.question, &contexts)
                })
                .await?;
                (answer, AnswerSource::Generated)
            }
            None => (context_proxy_answer(&contexts), AnswerSource::ContextProxy),
        };

        Ok(EvaluationRecord {
            question: question.question.clone(),
            ground_truth: question.ground_truth.clone(),
            retrieved_contexts: contexts,
            generated_answer,
            answer_source,
        })
    }

    async fn judge_records(&self, records: &[EvaluationRecord]) -> Result<MetricScores> {
        let judge = self.judge.as_ref();
        let scores = with_retry(&self.config.retry, judge.name(), || judge.score(records))
            .await
            .map_err(|e| match e {
                // Timeouts are raised as generation errors named after the operation.
                EvalError::GenerationError { kind, message, .. } => {
                    EvalError::judge(judge.name(), kind, message)
                }
                other => other,
            })?;
        validate_scores(judge.name(), &scores, records.len())?;
        Ok(scores)
    }
}

/// Copy each record's scores onto its succeeded result.
fn attach_scores(per_question: &mut [QuestionResult], scores: &MetricScores) {
    let succeeded = per_question.iter_mut().filter_map(|result| match result {
        QuestionResult::Succeeded { scores: record_scores, .. } => Some(record_scores),
        QuestionResult::Failed { .. } => None,
    });
    for (index, record_scores) in succeeded.enumerate() {
        for (metric, values) in scores {
            if let Some(value) = values.get(index) {
                record_scores.insert(metric.clone(), *value);
            }
        }
    }
}

/// Per-metric mean over every scored record.
fn aggregate(scores: &MetricScores) -> BTreeMap<String, f64> {
    scores
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(metric, values)| (metric.clone(), values.iter().sum::<f64>() / values.len() as f64))
        .collect()
}

/// Builder for an [`Evaluator`].
///
/// The retriever and judge are required. Without a generator, answers are
/// the retrieved contexts themselves.
#[derive(Default)]
pub struct EvaluatorBuilder {
    retriever: Option<Arc<Retriever>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    judge: Option<Arc<dyn Judge>>,
    config: Option<EvaluatorConfig>,
}

impl EvaluatorBuilder {
    pub fn retriever(mut self, retriever: Arc<Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn config(mut self, config: EvaluatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// # Errors
    ///
    /// [`EvalError::ConfigError`] if the retriever or judge is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Evaluator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let retriever = self
            .retriever
            .ok_or_else(|| EvalError::ConfigError("retriever is required".to_string()))?;
        let judge =
            self.judge.ok_or_else(|| EvalError::ConfigError("judge is required".to_string()))?;

        Ok(Evaluator { retriever, generator: self.generator, judge, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_the_reference_setup() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.collection, "company_documents");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let config = EvaluatorConfig::new("docs").with_top_k(0);
        assert!(matches!(config.validate(), Err(EvalError::ConfigError(_))));
    }

    #[test]
    fn aggregates_are_means_per_metric() {
        let scores = MetricScores::from([
            ("faithfulness".to_string(), vec![1.0, 0.5, 0.0]),
            ("context_recall".to_string(), vec![]),
        ]);
        let aggregate = aggregate(&scores);
        assert_eq!(aggregate.get("faithfulness"), Some(&0.5));
        assert!(!aggregate.contains_key("context_recall"));
    }

    #[test]
    fn scores_skip_failed_questions() {
        let record = |q: &str| EvaluationRecord {
            question: q.into(),
            ground_truth: vec![],
            retrieved_contexts: vec![],
            generated_answer: String::new(),
            answer_source: AnswerSource::ContextProxy,
        };
        let mut results = vec![
            QuestionResult::Succeeded { record: record("a"), scores: BTreeMap::new() },
            QuestionResult::Failed { question: "b".into(), ground_truth: vec![], error: "x".into() },
            QuestionResult::Succeeded { record: record("c"), scores: BTreeMap::new() },
        ];
        let scores = MetricScores::from([("faithfulness".to_string(), vec![0.25, 0.75])]);

        attach_scores(&mut results, &scores);

        assert_eq!(results[0].scores().unwrap()["faithfulness"], 0.25);
        assert!(results[1].scores().is_none());
        assert_eq!(results[2].scores().unwrap()["faithfulness"], 0.75);
    }
}
