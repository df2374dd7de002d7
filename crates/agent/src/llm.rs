//! Language-model gateway.
//!
//! Every failure is returned as an [`LlmError`]; callers turn it into an
//! explicit `error` intent. Nothing here retries.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const MAX_TOKENS: u32 = 512;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("no API key configured for the language model")]
    MissingApiKey,
    #[error("language model call timed out after {0}s")]
    Timeout(u64),
    #[error("language model transport error: {0}")]
    Transport(String),
    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model returned an empty response")]
    EmptyResponse,
    #[error("language model response could not be decoded: {0}")]
    Decode(String),
    #[error("language model is disabled")]
    Disabled,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str, temperature: f32)
        -> Result<String, LlmError>;
}

/// HTTP client for OpenAI-compatible (OpenAI, Groq, Ollama) and Anthropic
/// chat endpoints.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let base = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::Anthropic) => ANTHROPIC_DEFAULT_BASE_URL.to_string(),
            (None, _) => return Err(LlmError::Transport("llm.base_url is not set".to_string())),
        };
        let endpoint = match config.provider {
            LlmProvider::Anthropic => format!("{base}/messages"),
            LlmProvider::OpenAi => format!("{base}/chat/completions"),
            LlmProvider::Ollama => format!("{base}/v1/chat/completions"),
        };

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.clone(),
            endpoint,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn api_key(&self) -> Result<Option<&str>, LlmError> {
        let key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty());
        match (key, self.provider) {
            (Some(key), _) => Ok(Some(key)),
            (None, LlmProvider::Ollama) => Ok(None),
            (None, _) => Err(LlmError::MissingApiKey),
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::Transport(error.to_string())
        }
    }

    async fn complete_anthropic(
        &self,
        key: &str,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature,
            system,
            messages: vec![Message { role: "user", content: user }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|error| self.map_send_error(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: AnthropicResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        non_empty(completion.content.into_iter().next().map(|block| block.text))
    }

    async fn complete_openai(
        &self,
        key: Option<&str>,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let request = OpenAiRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature,
            messages: vec![
                Message { role: "system", content: system },
                Message { role: "user", content: user },
            ],
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|error| self.map_send_error(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let completion: OpenAiResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;
        non_empty(completion.choices.into_iter().next().and_then(|choice| choice.message.content))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let key = self.api_key()?;
        let started = std::time::Instant::now();
        let result = match (self.provider, key) {
            (LlmProvider::Anthropic, Some(key)) => {
                self.complete_anthropic(key, system, user, temperature).await
            }
            (LlmProvider::Anthropic, None) => Err(LlmError::MissingApiKey),
            (_, key) => self.complete_openai(key, system, user, temperature).await,
        };

        match &result {
            Ok(_) => tracing::debug!(
                event_name = "pipeline.llm.completed",
                provider = self.provider.as_str(),
                model = %self.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "language model call completed"
            ),
            Err(error) => tracing::warn!(
                event_name = "pipeline.llm.failed",
                provider = self.provider.as_str(),
                model = %self.model,
                error = %error,
                "language model call failed"
            ),
        }
        result
    }
}

fn non_empty(text: Option<String>) -> Result<String, LlmError> {
    text.filter(|text| !text.trim().is_empty()).ok_or(LlmError::EmptyResponse)
}

/// Gateway used when no model is configured. Every call fails explicitly.
#[derive(Clone, Debug, Default)]
pub struct DisabledLlmClient;

#[async_trait]
impl LlmClient for DisabledLlmClient {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

/// HTTP gateway for `config`, or the disabled gateway when the client cannot
/// be built. A missing key is not fatal here; each call reports it.
pub fn client_from_config(config: &LlmConfig) -> Arc<dyn LlmClient> {
    match HttpLlmClient::from_config(config) {
        Ok(client) => {
            tracing::info!(
                event_name = "system.llm.configured",
                correlation_id = "bootstrap",
                provider = config.provider.as_str(),
                model = %config.model,
                endpoint = client.endpoint(),
                "language model gateway ready"
            );
            Arc::new(client)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "system.llm.disabled",
                correlation_id = "bootstrap",
                error = %error,
                "language model gateway disabled"
            );
            Arc::new(DisabledLlmClient)
        }
    }
}

/// Replays queued replies in order and records every prompt it saw. Once
/// the queue is empty each call fails with [`LlmError::EmptyResponse`].
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedLlmClient {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self { replies: Mutex::new(replies.into_iter().collect()), prompts: Mutex::default() }
    }

    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push((system.to_string(), user.to_string())),
            Err(poisoned) => poisoned.into_inner().push((system.to_string(), user.to_string())),
        }
        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or(Err(LlmError::EmptyResponse))
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}
