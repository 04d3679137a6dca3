//! LLM Client: unified interface for OpenAI-compatible and Ollama backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::generator::TextGenerator;
use crate::retry::RetryPolicy;
use crate::types::{LlmRequest, LlmResponse};

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// Scheme and host, without the `/v1/...` path.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// Ollama server.
    Ollama {
        /// Scheme and host, without the `/api/...` path.
        base_url: String,
    },
    /// No LLM available; every call fails as unavailable.
    None,
}

impl LlmProvider {
    /// Build a provider from its configured name.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown provider name, or for
    /// `openai` without an API key.
    pub fn from_name(name: &str, base_url: &str, api_key: Option<String>) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match name.to_ascii_lowercase().as_str() {
            "openai" | "openai_compatible" => {
                let api_key = api_key
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| LlmError::ConfigError("OpenAI-compatible provider needs an API key".into()))?;
                Ok(Self::OpenAiCompatible { base_url, api_key })
            }
            "ollama" => Ok(Self::Ollama { base_url }),
            "none" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown LLM provider: '{other}'"))),
        }
    }
}

/// The main LLM client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    default_model: String,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(provider: LlmProvider, default_model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            http: Client::new(),
            default_model: default_model.into(),
            retry,
        }
    }

    /// Create a client with no LLM backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), RetryPolicy::none())
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// The configured provider.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    fn model_for<'a>(&'a self, request: &'a LlmRequest) -> &'a str {
        request.params.model_id.as_deref().unwrap_or(&self.default_model)
    }

    /// One attempt against the configured backend.
    async fn generate_once(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    /// Generate using Ollama's API.
    async fn generate_ollama(&self, base_url: &str, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request);
        let url = format!("{base_url}/api/generate");
        let body = json!({
            "model": model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.params.temperature,
                "num_predict": request.params.max_tokens,
            }
        });

        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(request.params.timeout_ms))
            .send()
            .await
            .map_err(|e| transport_error(e, request.params.timeout_ms))?;
        let json = success_json(resp, "Ollama").await?;

        let text = json["response"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("Ollama response has no 'response' field".into()))?
            .trim()
            .to_string();

        Ok(LlmResponse {
            text,
            tokens_generated: json["eval_count"].as_u64().map_or(0, saturating_u32),
            latency_ms: elapsed_ms(start),
            model: model.to_string(),
        })
    }

    /// Generate using an OpenAI-compatible API.
    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request);
        let url = format!("{base_url}/v1/chat/completions");
        let body = json!({
            "model": model,
            "messages": [
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.params.max_tokens,
            "temperature": request.params.temperature,
        });

        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(Duration::from_millis(request.params.timeout_ms))
            .send()
            .await
            .map_err(|e| transport_error(e, request.params.timeout_ms))?;
        let json = success_json(resp, "OpenAI API").await?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("completion has no choices[0].message.content".into()))?
            .trim()
            .to_string();

        Ok(LlmResponse {
            text,
            tokens_generated: json["usage"]["completion_tokens"].as_u64().map_or(0, saturating_u32),
            latency_ms: elapsed_ms(start),
            model: json["model"].as_str().unwrap_or(model).to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    /// Generate a response, retrying per the client's [`RetryPolicy`].
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        debug!(
            backend = self.backend_name(),
            model = self.model_for(request),
            prompt_chars = request.prompt.chars().count(),
            max_tokens = request.params.max_tokens,
            "Sending LLM request"
        );
        let response = self.retry.run(move || self.generate_once(request)).await?;
        debug!(
            latency_ms = response.latency_ms,
            tokens = response.tokens_generated,
            "LLM response received"
        );
        Ok(response)
    }

    fn backend_name(&self) -> &str {
        match self.provider {
            LlmProvider::OpenAiCompatible { .. } => "openai",
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::None => "none",
        }
    }
}

/// The body of a successful response as JSON, or a status error carrying
/// the provider's code and body.
async fn success_json(resp: reqwest::Response, backend: &str) -> Result<serde_json::Value, LlmError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %message, "{backend} returned error");
        return Err(LlmError::Status {
            code: status.as_u16(),
            message,
        });
    }
    resp.json()
        .await
        .map_err(|e| LlmError::ParseError(e.to_string()))
}

fn transport_error(err: reqwest::Error, timeout_ms: u64) -> LlmError {
    if err.is_timeout() {
        warn!(timeout_ms, "LLM request timed out");
        LlmError::Timeout(timeout_ms)
    } else {
        warn!(error = %err, "LLM request failed");
        LlmError::from(err)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
