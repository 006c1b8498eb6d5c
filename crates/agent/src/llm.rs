use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use coachline_core::config::LlmConfig;
use coachline_core::domain::plan::PromptPlan;
use coachline_core::telemetry::{preview, UsageMetadata};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

const ERROR_BODY_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
}

impl CompletionParams {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self { model: config.model.clone(), temperature: config.temperature }
    }
}

/// Raw backend output. `text` may be empty when the provider returned no choices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub id: Option<String>,
    pub usage: Option<UsageMetadata>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("coaching backend request failed: {0}")]
    Transport(String),
    #[error("coaching backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("coaching backend response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CoachingBackend: Send + Sync {
    async fn complete(
        &self,
        plan: &PromptPlan,
        params: &CompletionParams,
    ) -> Result<Completion, BackendError>;
}

/// Chat-completions client for OpenAI and any provider exposing the same API (Ollama).
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| BackendError::Transport(error.to_string()))?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, api_key })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BackendError> {
        Self::new(
            config.effective_base_url(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CoachingBackend for OpenAiCompatibleBackend {
    async fn complete(
        &self,
        plan: &PromptPlan,
        params: &CompletionParams,
    ) -> Result<Completion, BackendError> {
        let body = ChatCompletionRequest {
            model: &params.model,
            temperature: params.temperature,
            messages: plan
                .turns()
                .iter()
                .map(|turn| ChatMessage { role: turn.role.as_str(), content: &turn.content })
                .collect(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| BackendError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: preview(&body, ERROR_BODY_CHARS),
            });
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|error| BackendError::Decode(error.to_string()))?;

        Ok(parsed.into_completion())
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_completion(self) -> Completion {
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default();
        Completion { text, id: self.id, usage: self.usage }
    }
}

/// Backend double that replays queued replies and remembers every plan it was given.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Completion, BackendError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<(PromptPlan, CompletionParams)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `text` whenever the queue is empty.
    pub fn replying(text: impl Into<String>) -> Self {
        Self { fallback: Some(text.into()), ..Self::default() }
    }

    pub async fn push_reply(&self, text: impl Into<String>) {
        self.script.lock().await.push_back(Ok(Completion::text(text)));
    }

    pub async fn push_completion(&self, completion: Completion) {
        self.script.lock().await.push_back(Ok(completion));
    }

    pub async fn push_error(&self, error: BackendError) {
        self.script.lock().await.push_back(Err(error));
    }

    pub async fn calls(&self) -> Vec<(PromptPlan, CompletionParams)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CoachingBackend for ScriptedBackend {
    async fn complete(
        &self,
        plan: &PromptPlan,
        params: &CompletionParams,
    ) -> Result<Completion, BackendError> {
        self.calls.lock().await.push((plan.clone(), params.clone()));

        if let Some(next) = self.script.lock().await.pop_front() {
            return next;
        }
        match &self.fallback {
            Some(text) => Ok(Completion::text(text.clone())),
            None => Err(BackendError::Transport("scripted backend has no reply queued".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use coachline_core::domain::conversation::Turn;
    use coachline_core::domain::plan::PromptPlan;
    use coachline_core::telemetry::UsageMetadata;

    use super::{
        BackendError, ChatCompletionResponse, CoachingBackend, CompletionParams,
        OpenAiCompatibleBackend, ScriptedBackend,
    };

    fn params() -> CompletionParams {
        CompletionParams { model: "gpt-4o-mini".to_string(), temperature: 0.4 }
    }

    fn plan() -> PromptPlan {
        PromptPlan::new(
            &[Turn::system("be brief").expect("turn")],
            &[Turn::user("hello").expect("turn")],
        )
    }

    #[test]
    fn response_decoding_takes_first_choice_and_usage() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "choices": [
                    {"message": {"role": "assistant", "content": "first"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            }"#,
        )
        .expect("response should decode");

        let completion = parsed.into_completion();
        assert_eq!(completion.text, "first");
        assert_eq!(completion.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(
            completion.usage,
            Some(UsageMetadata {
                prompt_tokens: Some(12),
                completion_tokens: Some(3),
                total_tokens: Some(15),
            })
        );
    }

    #[test]
    fn response_without_choices_yields_empty_text() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices": []}"#).expect("response should decode");
        let completion = parsed.into_completion();
        assert!(completion.text.is_empty());
        assert!(completion.usage.is_none());
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let backend = OpenAiCompatibleBackend::new(
            "http://localhost:11434/v1/",
            None,
            std::time::Duration::from_secs(5),
        )
        .expect("client should build");
        assert_eq!(backend.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn scripted_backend_replays_queue_then_fallback() {
        let backend = ScriptedBackend::replying("fallback");
        backend.push_reply("scripted").await;
        backend.push_error(BackendError::Status { status: 503, body: "busy".to_string() }).await;

        let first = backend.complete(&plan(), &params()).await.expect("first reply");
        assert_eq!(first.text, "scripted");
        assert!(matches!(
            backend.complete(&plan(), &params()).await,
            Err(BackendError::Status { status: 503, .. })
        ));
        let third = backend.complete(&plan(), &params()).await.expect("fallback reply");
        assert_eq!(third.text, "fallback");
        assert_eq!(backend.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn empty_script_without_fallback_is_a_transport_error() {
        let backend = ScriptedBackend::new();
        let result = backend.complete(&plan(), &params()).await;
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }
}
