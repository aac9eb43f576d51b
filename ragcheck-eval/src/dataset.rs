//! Evaluation question sets.
//!
//! A question set is a JSON array of objects:
//!
//! ```json
//! [
//!   {
//!     "question": "What is the company's vacation policy?",
//!     "ground_truth": ["Employees receive 20 vacation days per year."]
//!   }
//! ]
//! ```
//!
//! Ground truth is always a list of statements, even when there is only one.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// One question with its reference statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    pub ground_truth: Vec<String>,
}

impl EvalQuestion {
    pub fn new<I, S>(question: impl Into<String>, ground_truth: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            question: question.into(),
            ground_truth: ground_truth.into_iter().map(Into::into).collect(),
        }
    }
}

/// An ordered, validated list of [`EvalQuestion`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuestionSet {
    questions: Vec<EvalQuestion>,
}

impl QuestionSet {
    /// Wrap questions, rejecting any with an empty question text.
    pub fn new(questions: Vec<EvalQuestion>) -> Result<Self> {
        if let Some(position) = questions.iter().position(|q| q.question.trim().is_empty()) {
            return Err(EvalError::DatasetError(format!("question {position} is empty")));
        }
        Ok(Self { questions })
    }

    /// Parse a JSON array of questions.
    ///
    /// # Errors
    ///
    /// [`EvalError::DatasetError`] for malformed JSON, a `ground_truth` that
    /// is not a list of strings, or an empty question.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let questions: Vec<EvalQuestion> = serde_json::from_str(json)
            .map_err(|e| EvalError::DatasetError(format!("invalid question set: {e}")))?;
        Self::new(questions)
    }

    /// Read and parse a question set file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn questions(&self) -> &[EvalQuestion] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvalQuestion> {
        self.questions.iter()
    }

    pub fn into_inner(self) -> Vec<EvalQuestion> {
        self.questions
    }
}

impl<'a> IntoIterator for &'a QuestionSet {
    type Item = &'a EvalQuestion;
    type IntoIter = std::slice::Iter<'a, EvalQuestion>;

    fn into_iter(self) -> Self::IntoIter {
        self.questions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_ground_truth() {
        let set = QuestionSet::from_json_str(
            r#"[{"question": "Who approves leave?", "ground_truth": ["The manager.", "HR is informed."]}]"#,
        )
        .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.questions()[0].ground_truth.len(), 2);
    }

    #[test]
    fn bare_string_ground_truth_is_rejected() {
        let err = QuestionSet::from_json_str(
            r#"[{"question": "Who approves leave?", "ground_truth": "The manager."}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::DatasetError(_)));
    }

    #[test]
    fn empty_question_is_rejected() {
        let err = QuestionSet::new(vec![
            EvalQuestion::new("Is there a dress code?", ["No."]),
            EvalQuestion::new("  ", ["Yes."]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("question 1"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = QuestionSet::from_path(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, EvalError::Io(_)));
    }
}
