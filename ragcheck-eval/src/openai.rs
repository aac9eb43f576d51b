//! Chat-model answer generator and judge backed by the OpenAI API.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use ragcheck_rag::ProviderErrorKind;
use ragcheck_rag::openai::{classify_status, classify_transport};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{EvalError, Result};
use crate::generator::AnswerGenerator;
use crate::judge::{CONTEXT_PRECISION, CONTEXT_RECALL, FAITHFULNESS, Judge, MetricScores};
use crate::report::EvaluationRecord;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Minimal chat-completions client shared by the generator and the judge.
struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// A failed chat call: kind for retry decisions plus a description.
type ChatFailure = (ProviderErrorKind, String);

impl ChatClient {
    fn new(api_key: String) -> std::result::Result<Self, String> {
        if api_key.is_empty() {
            return Err("OpenAI API key must not be empty".into());
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            url: OPENAI_CHAT_URL.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.0,
        })
    }

    fn api_key_from_env() -> Result<String> {
        std::env::var("OPENAI_API_KEY").map_err(|_| {
            EvalError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> std::result::Result<String, ChatFailure> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| (classify_transport(&e), format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err((classify_status(status), format!("API returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            (ProviderErrorKind::InvalidInput, format!("failed to parse response: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| (ProviderErrorKind::InvalidInput, "response has no content".to_string()))
    }
}

const STUFF_SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the question \
at the end. If you don't know the answer, just say that you don't know, don't try to make up \
an answer.";

/// Put every context into a single prompt.
pub fn stuff_prompt(question: &str, contexts: &[String]) -> String {
    format!("{}\n\nQuestion: {question}\nHelpful Answer:", contexts.join("\n\n"))
}

/// An [`AnswerGenerator`] that answers from all contexts in one chat call.
///
/// Defaults to `gpt-3.5-turbo` at temperature 0.
///
/// # Example
///
/// ```rust,ignore
/// use ragcheck_eval::openai::OpenAiAnswerGenerator;
///
/// let generator = OpenAiAnswerGenerator::from_env()?;
/// let answer = generator.generate("What is the vacation policy?", &contexts).await?;
/// ```
pub struct OpenAiAnswerGenerator {
    chat: ChatClient,
}

impl OpenAiAnswerGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let chat = ChatClient::new(api_key.into()).map_err(EvalError::ConfigError)?;
        Ok(Self { chat })
    }

    /// Create a generator using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(ChatClient::api_key_from_env()?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.chat.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.chat.temperature = temperature;
        self
    }

    /// Send requests to a compatible endpoint instead of the public API.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.chat.url = url.into();
        self
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiAnswerGenerator {
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String> {
        debug!(model = %self.chat.model, contexts = contexts.len(), "generating answer");
        self.chat
            .complete(STUFF_SYSTEM_PROMPT, &stuff_prompt(question, contexts), false)
            .await
            .map(|answer| answer.trim().to_string())
            .map_err(|(kind, message)| {
                error!(model = %self.chat.model, %kind, %message, "generation failed");
                EvalError::generation("openai", kind, message)
            })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

const JUDGE_SYSTEM_PROMPT: &str = "You grade retrieval-augmented answers. Reply with a JSON \
object with the keys context_precision, context_recall and faithfulness, each a number \
between 0 and 1. context_precision: share of the contexts relevant to the ground truth. \
context_recall: share of the ground truth statements supported by the contexts. \
faithfulness: share of the answer's claims supported by the contexts.";

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    context_precision: f64,
    context_recall: f64,
    faithfulness: f64,
}

fn judge_prompt(record: &EvaluationRecord) -> String {
    let numbered = |items: &[String]| {
        let lines: Vec<String> =
            items.iter().enumerate().map(|(i, s)| format!("{}. {s}", i + 1)).collect();
        lines.join("\n")
    };
    format!(
        "Question: {}\n\nGround truth:\n{}\n\nContexts:\n{}\n\nAnswer: {}",
        record.question,
        numbered(&record.ground_truth),
        numbered(&record.retrieved_contexts),
        record.generated_answer
    )
}

/// Parse a verdict and clamp every score into `[0, 1]`.
fn parse_verdict(reply: &str) -> Result<JudgeVerdict> {
    let verdict: JudgeVerdict = serde_json::from_str(reply).map_err(|e| {
        EvalError::judge("openai", ProviderErrorKind::InvalidInput, format!("bad verdict: {e}"))
    })?;
    let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    Ok(JudgeVerdict {
        context_precision: clamp(verdict.context_precision),
        context_recall: clamp(verdict.context_recall),
        faithfulness: clamp(verdict.faithfulness),
    })
}

/// A [`Judge`] that asks a chat model for the three scores of each record.
pub struct OpenAiJudge {
    chat: ChatClient,
}

impl OpenAiJudge {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let chat = ChatClient::new(api_key.into()).map_err(EvalError::ConfigError)?;
        Ok(Self { chat })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ChatClient::api_key_from_env()?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.chat.model = model.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.chat.url = url.into();
        self
    }
}

#[async_trait]
impl Judge for OpenAiJudge {
    async fn score(&self, records: &[EvaluationRecord]) -> Result<MetricScores> {
        let mut precision = Vec::with_capacity(records.len());
        let mut recall = Vec::with_capacity(records.len());
        let mut faithfulness = Vec::with_capacity(records.len());

        for record in records {
            let reply = self
                .chat
                .complete(JUDGE_SYSTEM_PROMPT, &judge_prompt(record), true)
                .await
                .map_err(|(kind, message)| EvalError::judge("openai", kind, message))?;
            let verdict = parse_verdict(&reply)?;
            precision.push(verdict.context_precision);
            recall.push(verdict.context_recall);
            faithfulness.push(verdict.faithfulness);
        }

        Ok(MetricScores::from([
            (CONTEXT_PRECISION.to_string(), precision),
            (CONTEXT_RECALL.to_string(), recall),
            (FAITHFULNESS.to_string(), faithfulness),
        ]))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::AnswerSource;

    #[test]
    fn stuff_prompt_contains_every_context() {
        let prompt = stuff_prompt("Who approves?", &["first".into(), "second".into()]);
        assert!(prompt.starts_with("first\n\nsecond"));
        assert!(prompt.ends_with("Question: Who approves?\nHelpful Answer:"));
    }

    #[test]
    fn verdict_scores_are_clamped() {
        let reply = r#"{"context_precision": 1.4, "context_recall": -0.2, "faithfulness": 0.5}"#;
        let verdict = parse_verdict(reply).unwrap();
        assert_eq!(verdict.context_precision, 1.0);
        assert_eq!(verdict.context_recall, 0.0);
        assert_eq!(verdict.faithfulness, 0.5);
    }

    #[test]
    fn malformed_verdict_is_a_judge_error() {
        let err = parse_verdict("not json").unwrap_err();
        assert!(matches!(err, EvalError::JudgeError { .. }));
    }

    #[test]
    fn judge_prompt_numbers_contexts() {
        let record = EvaluationRecord {
            question: "q".into(),
            ground_truth: vec!["truth".into()],
            retrieved_contexts: vec!["a".into(), "b".into()],
            generated_answer: "answer".into(),
            answer_source: AnswerSource::Generated,
        };
        let prompt = judge_prompt(&record);
        assert!(prompt.contains("1. a\n2. b"));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(OpenAiJudge::new(""), Err(EvalError::ConfigError(_))));
    }
}
