/// LLM Client: the single point of entry for all Gemini API calls.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// All model interactions MUST go through the `TextModel` trait.
///
/// The client does not retry on its own and does not pick keys: every call
/// takes the key chosen by the step executor, which owns rotation and backoff.
///
/// Model: gemini-2.5-flash (hardcoded; do not make configurable to prevent drift)
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod extract;
pub mod prompts;

pub use extract::extract_json;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for all generation calls.
pub const MODEL: &str = "gemini-2.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 65536;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Content blocked by provider: {0}")]
    Blocked(String),

    #[error("Response failed validation: {0}")]
    Validation(String),
}

/// How a provider failure should be treated by the step executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Overloaded,
    RateLimited,
    ServerError,
    InvalidRequest,
    Unauthorized,
    Other,
}

impl FailureClass {
    /// Fatal failures abort the step without trying the remaining keys.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureClass::InvalidRequest | FailureClass::Unauthorized)
    }
}

impl LlmError {
    pub fn classify(&self) -> FailureClass {
        match self {
            LlmError::Api { status, message } => classify_provider(Some(*status), message),
            LlmError::Http(e) => classify_provider(e.status().map(|s| s.as_u16()), &e.to_string()),
            _ => FailureClass::Other,
        }
    }
}

fn classify_provider(status: Option<u16>, message: &str) -> FailureClass {
    let lower = message.to_ascii_lowercase();

    if status == Some(401) {
        return FailureClass::Unauthorized;
    }
    if status == Some(400) || message.contains("API_KEY_INVALID") {
        return FailureClass::InvalidRequest;
    }
    if status == Some(503) || lower.contains("overloaded") {
        return FailureClass::Overloaded;
    }
    if status == Some(429) || message.contains("RESOURCE_EXHAUSTED") || lower.contains("quota") {
        return FailureClass::RateLimited;
    }
    if status == Some(500) {
        return FailureClass::ServerError;
    }
    FailureClass::Other
}

/// Output format requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Free-form prose or Markdown.
    Text,
    /// Provider-side JSON mode. Responses still go through `extract_json`.
    Json,
}

impl ResponseMode {
    fn mime_type(self) -> &'static str {
        match self {
            ResponseMode::Text => "text/plain",
            ResponseMode::Json => "application/json",
        }
    }

    fn temperature(self) -> f32 {
        match self {
            ResponseMode::Text => 0.7,
            ResponseMode::Json => 0.5,
        }
    }
}

/// A text-generating model reachable with a caller-supplied API key.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, after rejecting responses the
    /// provider cut off for safety or recitation.
    pub fn into_text(self) -> Result<String, LlmError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Blocked(format!("prompt blocked ({reason})")));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyContent)?;

        match candidate.finish_reason.as_deref() {
            Some("SAFETY") => {
                return Err(LlmError::Blocked("Content blocked by safety filters".into()))
            }
            Some("RECITATION") => {
                return Err(LlmError::Blocked("Content flagged for recitation".into()))
            }
            Some("STOP") | None => {}
            Some(other) => warn!("Unusual finish reason from Gemini: {other}"),
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
    status: Option<String>,
}

/// The Gemini `generateContent` client shared by every pipeline step.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: String,
}

impl LlmClient {
    pub fn new() -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint: format!("{GEMINI_API_BASE}/{MODEL}:generateContent"),
        })
    }

    /// Makes a single raw call and returns the full response object.
    pub async fn call(
        &self,
        api_key: &str,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<GeminiResponse, LlmError> {
        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: mode.temperature(),
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: mode.mime_type(),
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Keep the provider status marker (e.g. RESOURCE_EXHAUSTED) in the
            // message so classification can see it.
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| match e.error.status {
                    Some(s) => format!("{s}: {}", e.error.message),
                    None => e.error.message,
                })
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={}, output_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        Ok(gemini_response)
    }
}

#[async_trait]
impl TextModel for LlmClient {
    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<String, LlmError> {
        self.call(api_key, prompt, mode).await?.into_text()
    }
}

/// Runs a model response through `extract_json` and deserializes it.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let cleaned = extract_json(raw);
    serde_json::from_str(&cleaned).map_err(LlmError::Parse)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted model: answers each prompt by the first rule whose marker the
    /// prompt contains. Rules hold a queue of replies; the last reply repeats.
    #[derive(Default)]
    pub struct ScriptedModel {
        rules: Mutex<Vec<(String, VecDeque<Result<String, u16>>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn reply(self, marker: &str, text: impl Into<String>) -> Self {
            self.replies(marker, vec![Ok(text.into())])
        }

        /// Replies with an API error of the given status.
        pub fn fail(self, marker: &str, status: u16) -> Self {
            self.replies(marker, vec![Err(status)])
        }

        pub fn replies(self, marker: &str, replies: Vec<Result<String, u16>>) -> Self {
            self.rules
                .lock()
                .unwrap()
                .push((marker.to_string(), replies.into()));
            self
        }

        /// Number of calls whose prompt contained `marker`.
        pub fn calls_matching(&self, marker: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.contains(marker))
                .count()
        }

        /// The most recent prompt containing `marker`.
        pub fn last_prompt(&self, marker: &str) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|p| p.contains(marker))
                .cloned()
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn generate(
            &self,
            _api_key: &str,
            prompt: &str,
            _mode: ResponseMode,
        ) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            let mut rules = self.rules.lock().unwrap();
            let Some((_, queue)) = rules.iter_mut().find(|(m, _)| prompt.contains(m.as_str()))
            else {
                return Err(LlmError::Api {
                    status: 500,
                    message: "no scripted reply".into(),
                });
            };
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            match reply {
                Some(Ok(text)) => Ok(text),
                Some(Err(status)) => Err(LlmError::Api {
                    status,
                    message: format!("scripted failure {status}"),
                }),
                None => Err(LlmError::EmptyContent),
            }
        }
    }
}
