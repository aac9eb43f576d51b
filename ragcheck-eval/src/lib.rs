//! # ragcheck-eval
//!
//! Quality evaluation for retrieval-augmented answers.
//!
//! ## Overview
//!
//! An [`Evaluator`] takes a [`QuestionSet`], retrieves contexts for every
//! question from a collection, produces an answer (with an
//! [`AnswerGenerator`], or from the contexts themselves), and asks a
//! [`Judge`] to score the results on:
//!
//! - `context_precision`: are the retrieved contexts relevant to the ground truth?
//! - `context_recall`: does the retrieved context cover the ground truth?
//! - `faithfulness`: is the answer supported by the retrieved context?
//!
//! [`LexicalJudge`] scores offline from word overlap. With the `openai`
//! feature, `openai::OpenAiAnswerGenerator` and `openai::OpenAiJudge` use a
//! chat model instead.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ragcheck_eval::{Evaluator, EvaluatorConfig, LexicalJudge, QuestionSet};
//!
//! let evaluator = Evaluator::builder()
//!     .retriever(retriever)
//!     .judge(Arc::new(LexicalJudge::new()))
//!     .config(EvaluatorConfig::new("company_documents"))
//!     .build()?;
//!
//! let report = evaluator.evaluate(QuestionSet::from_path("questions.json")?.questions()).await?;
//! println!("{}", report.to_json_pretty()?);
//! ```

pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod judge;
#[cfg(feature = "openai")]
pub mod openai;
pub mod report;

pub use dataset::{EvalQuestion, QuestionSet};
pub use error::{EvalError, Result};
pub use evaluator::{Evaluator, EvaluatorBuilder, EvaluatorConfig};
pub use generator::{AnswerGenerator, AnswerSource, NO_CONTEXT_ANSWER, context_proxy_answer};
pub use judge::{
    CONTEXT_PRECISION, CONTEXT_RECALL, FAITHFULNESS, Judge, LexicalJudge, MetricScores,
    REQUIRED_METRICS, validate_scores,
};
pub use report::{EvaluationRecord, EvaluationReport, QuestionResult};
