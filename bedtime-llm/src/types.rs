//! Core types for LLM requests and responses.

use serde::{Deserialize, Serialize};

/// Sampling and transport parameters for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Model to use; the client's default model when `None`.
    pub model_id: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 3000,
            temperature: 0.1,
            model_id: None,
            timeout_ms: 60_000,
        }
    }
}

impl GenerationParams {
    /// Parameters with the given token budget and temperature.
    #[must_use]
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
            ..Self::default()
        }
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// The full prompt text.
    pub prompt: String,
    /// Call parameters.
    pub params: GenerationParams,
}

impl LlmRequest {
    /// Create a request.
    #[must_use]
    pub fn new(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            params,
        }
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}
