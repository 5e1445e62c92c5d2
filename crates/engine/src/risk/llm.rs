//! Risk assessment delegated to a language model.
//!
//! [`LlmRiskAssessor`] owns the prompt and the verdict parsing; an
//! [`LlmClient`] only moves text to and from a model. [`AnthropicClient`]
//! (feature `anthropic`) speaks the Anthropic Messages API over `ureq`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::risk::{risk_log, strip_code_fences, AssessmentError, RiskAssessment, RiskAssessor};
use crate::types::Transaction;

/// Environment variable holding the Anthropic API key.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// No credentials were configured; nothing was sent.
    #[error("LLM client not configured: {0} is not set")]
    MissingApiKey(&'static str),

    #[error("LLM transport failure: {0}")]
    Transport(String),

    #[error("LLM service answered HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The service replied but the body was not a usable completion.
    #[error("LLM reply unreadable: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversational turn. The system prompt travels separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Transport to a text-completion model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete the conversation `turns` under `system`, returning the
    /// model's reply text.
    async fn complete(
        &self,
        model: &str,
        system: &str,
        turns: &[Message],
    ) -> Result<String, LlmError>;
}

/// A risk assessor that asks an LLM to act as a fraud analyst.
///
/// Serializes the transaction log into a prompt, calls the LLM, and reads
/// the JSON verdict with field-level defaults. Unparsable output is
/// re-prompted up to `max_retries` times.
pub struct LlmRiskAssessor {
    pub client: Box<dyn LlmClient>,
    /// Replaces the built-in analyst prompt when non-empty.
    pub system_prompt: String,
    pub model: String,
    /// Re-prompts allowed after an unparsable reply.
    pub max_retries: usize,
}

impl LlmRiskAssessor {
    pub fn new(client: Box<dyn LlmClient>, model: String) -> Self {
        Self {
            client,
            system_prompt: String::new(),
            model,
            max_retries: 2,
        }
    }

    fn default_system_prompt() -> &'static str {
        r#"You are a senior financial fraud analyst for a remittance wallet that credits
cash vouchers to user balances.

Analyze the transaction log you are given for suspicious activity. Look for:
1. Velocity attacks: multiple failed voucher attempts in short succession (brute force).
2. Replay attacks: attempts to reuse vouchers that were already redeemed (reason ALREADY_CONSUMED).
3. Smurfing: many small deposits just under reportable limits.

Respond with a JSON object in exactly this format:

{
  "riskScore": <number 0-100>,
  "riskLevel": "LOW" | "MEDIUM" | "HIGH" | "CRITICAL",
  "analysis": "<a concise paragraph explaining the findings>",
  "recommendedAction": "<one sentence, e.g. Block User, Flag for Review, None>"
}

Respond only with valid JSON. Do not include markdown fences or other text."#
    }

    fn system(&self) -> &str {
        if self.system_prompt.is_empty() {
            Self::default_system_prompt()
        } else {
            &self.system_prompt
        }
    }

    fn build_user_message(history: &[Transaction]) -> String {
        let log = serde_json::to_string_pretty(&risk_log(history))
            .unwrap_or_else(|_| "[]".to_string());
        format!("Transactions:\n{log}")
    }

    /// Any JSON object is a verdict (missing fields are defaulted); anything
    /// else earns a re-prompt.
    fn parse_response(response: &str) -> Result<RiskAssessment, String> {
        let value: serde_json::Value = serde_json::from_str(strip_code_fences(response))
            .map_err(|e| format!("Failed to parse JSON: {e}"))?;
        if !value.is_object() {
            return Err("Response is not a JSON object".to_string());
        }
        Ok(RiskAssessment::from_response(&value))
    }
}

#[async_trait]
impl RiskAssessor for LlmRiskAssessor {
    async fn assess(&self, history: &[Transaction]) -> Result<RiskAssessment, AssessmentError> {
        let mut turns = vec![Message::user(Self::build_user_message(history))];
        let mut attempt = 0;

        loop {
            // Transport and status failures end the assessment immediately.
            let reply = self
                .client
                .complete(&self.model, self.system(), &turns)
                .await
                .map_err(|e| AssessmentError::Unavailable(e.to_string()))?;

            let parse_error = match Self::parse_response(&reply) {
                Ok(assessment) => return Ok(assessment),
                Err(e) => e,
            };
            if attempt >= self.max_retries {
                tracing::warn!(
                    max_retries = self.max_retries,
                    error = %parse_error,
                    "LLM risk assessor retries exhausted"
                );
                return Err(AssessmentError::Parse(parse_error));
            }
            attempt += 1;
            tracing::debug!(attempt, error = %parse_error, "re-prompting risk assessor");
            turns.push(Message::assistant(reply));
            turns.push(Message::user(format!(
                "Your response was invalid: {parse_error}. \
                 Please try again, responding with valid JSON only."
            )));
        }
    }
}

// ── Anthropic Messages API ──────────────────────────────────────────────────

#[cfg(feature = "anthropic")]
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

#[cfg(feature = "anthropic")]
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[cfg(feature = "anthropic")]
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
}

#[cfg(feature = "anthropic")]
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[cfg(feature = "anthropic")]
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(feature = "anthropic")]
impl MessagesResponse {
    /// The first text block of the reply.
    fn into_text(self) -> Result<String, LlmError> {
        self.content
            .into_iter()
            .filter(|block| block.kind == "text")
            .find_map(|block| block.text)
            .ok_or_else(|| LlmError::Malformed("reply has no text block".to_string()))
    }
}

/// [`LlmClient`] for the Anthropic Messages API.
#[cfg(feature = "anthropic")]
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
}

#[cfg(feature = "anthropic")]
impl AnthropicClient {
    /// Read the key from [`API_KEY_VAR`].
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_key(std::env::var(API_KEY_VAR).ok())
    }

    fn from_key(key: Option<String>) -> Result<Self, LlmError> {
        match key {
            Some(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(LlmError::MissingApiKey(API_KEY_VAR)),
        }
    }

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn post(&self, body: serde_json::Value) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = ureq::Agent::new_with_defaults()
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => LlmError::Status {
                    status,
                    message: "Messages API rejected the request".to_string(),
                },
                other => LlmError::Transport(other.to_string()),
            })?;
        response
            .into_body()
            .read_json::<MessagesResponse>()
            .map_err(|e| LlmError::Malformed(e.to_string()))?
            .into_text()
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        turns: &[Message],
    ) -> Result<String, LlmError> {
        let body = serde_json::to_value(MessagesRequest {
            model,
            max_tokens: 1024,
            system,
            messages: turns,
        })
        .map_err(|e| LlmError::Malformed(e.to_string()))?;

        // ureq blocks; run it off the async workers.
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.post(body))
            .await
            .map_err(|e| LlmError::Transport(format!("request task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLevel;
    use crate::types::{FailureReason, TransactionMetadata, TransactionStatus, TransactionType};
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays scripted replies in order and records every request.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Arc<Mutex<Vec<(String, Vec<Message>)>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(
            &self,
            _model: &str,
            system: &str,
            turns: &[Message],
        ) -> Result<String, LlmError> {
            self.requests
                .lock()
                .unwrap()
                .push((system.to_string(), turns.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
        }
    }

    fn replay_history() -> Vec<Transaction> {
        vec![Transaction::new(
            TransactionType::Deposit,
            Decimal::ZERO,
            "Voucher redemption failed",
            TransactionStatus::Failed,
            TransactionMetadata {
                failure_reason: Some(FailureReason::AlreadyConsumed),
                ..Default::default()
            },
        )]
    }

    #[tokio::test]
    async fn parses_valid_verdict() {
        let response = r#"{"riskScore": 72, "riskLevel": "HIGH", "analysis": "Replay attempt.", "recommendedAction": "Flag for Review"}"#;
        let client = ScriptedClient::new(vec![Ok(response.to_string())]);
        let assessor = LlmRiskAssessor::new(Box::new(client), "test-model".to_string());

        let a = assessor.assess(&replay_history()).await.unwrap();
        assert_eq!(a.risk_score, 72);
        assert_eq!(a.risk_level, RiskLevel::High);
        assert_eq!(a.recommended_action, "Flag for Review");
    }

    #[tokio::test]
    async fn fenced_partial_verdict_is_defaulted() {
        let response = "```json\n{\"riskLevel\": \"MEDIUM\"}\n```";
        let client = ScriptedClient::new(vec![Ok(response.to_string())]);
        let assessor = LlmRiskAssessor::new(Box::new(client), "test-model".to_string());

        let a = assessor.assess(&[]).await.unwrap();
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert_eq!(a.risk_score, 0);
        assert_eq!(a.analysis, "No anomalies detected.");
        assert_eq!(a.recommended_action, "None");
    }

    #[tokio::test]
    async fn retries_after_garbage_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Ok("I think this looks fine".to_string()),
            Ok(r#"{"riskScore": 10, "riskLevel": "LOW"}"#.to_string()),
        ]);
        let requests = Arc::clone(&client.requests);
        let assessor = LlmRiskAssessor::new(Box::new(client), "test-model".to_string());

        let a = assessor.assess(&[]).await.unwrap();
        assert_eq!(a.risk_score, 10);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].0.contains("fraud analyst"));
        // The retry carries the bad answer and a correction prompt.
        let turns = &requests[1].1;
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1], Message::assistant("I think this looks fine"));
        assert_eq!(turns[2].role, Role::User);
        assert!(turns[2].content.contains("Your response was invalid"));
    }

    #[tokio::test]
    async fn retries_exhausted_is_parse_error() {
        let client = ScriptedClient::new(vec![
            Ok("nope".to_string()),
            Ok("[1, 2, 3]".to_string()),
            Ok("still nope".to_string()),
        ]);
        let assessor = LlmRiskAssessor::new(Box::new(client), "test-model".to_string());
        assert!(matches!(
            assessor.assess(&[]).await,
            Err(AssessmentError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn transport_error_is_unavailable() {
        let client = ScriptedClient::new(vec![Err(LlmError::Transport(
            "connection refused".to_string(),
        ))]);
        let assessor = LlmRiskAssessor::new(Box::new(client), "test-model".to_string());
        let err = assessor.assess(&[]).await.unwrap_err();
        assert_eq!(
            err,
            AssessmentError::Unavailable("LLM transport failure: connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_as_such() {
        let client = ScriptedClient::new(vec![Err(LlmError::MissingApiKey(API_KEY_VAR))]);
        let assessor = LlmRiskAssessor::new(Box::new(client), "test-model".to_string());
        let err = assessor.assess(&[]).await.unwrap_err();
        assert_eq!(
            err,
            AssessmentError::Unavailable(
                "LLM client not configured: ANTHROPIC_API_KEY is not set".to_string()
            )
        );
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn blank_or_absent_key_is_missing_api_key() {
        assert_eq!(
            AnthropicClient::from_key(None).unwrap_err(),
            LlmError::MissingApiKey(API_KEY_VAR)
        );
        assert_eq!(
            AnthropicClient::from_key(Some("  ".to_string())).unwrap_err(),
            LlmError::MissingApiKey(API_KEY_VAR)
        );
        assert!(AnthropicClient::from_key(Some("sk-test".to_string())).is_ok());
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn reply_text_is_first_text_block() {
        let reply: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "{\"riskScore\": 5}"}
            ]
        }))
        .unwrap();
        assert_eq!(reply.into_text().unwrap(), "{\"riskScore\": 5}");

        let empty: MessagesResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(empty.into_text(), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn prompt_carries_transaction_log() {
        let msg = LlmRiskAssessor::build_user_message(&replay_history());
        assert!(msg.contains("ALREADY_CONSUMED"));
        assert!(msg.contains("\"type\": \"DEPOSIT\""));
        assert!(msg.contains("\"status\": \"FAILED\""));
        assert!(LlmRiskAssessor::default_system_prompt().contains("Replay attacks"));
    }

    #[cfg(feature = "anthropic")]
    #[tokio::test]
    #[ignore] // Requires ANTHROPIC_API_KEY environment variable
    async fn anthropic_integration() {
        let client = AnthropicClient::from_env().expect("ANTHROPIC_API_KEY required");
        let assessor =
            LlmRiskAssessor::new(Box::new(client), "claude-sonnet-4-20250514".to_string());
        let a = assessor.assess(&replay_history()).await.unwrap();
        assert!(a.risk_score <= 100);
    }
}
