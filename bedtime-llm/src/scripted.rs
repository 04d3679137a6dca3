//! Deterministic generator that replays queued replies.
//!
//! Used by tests to drive the storyteller without a network: every call
//! pops the next scripted reply and records the request it received.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LlmError;
use crate::generator::TextGenerator;
use crate::types::{LlmRequest, LlmResponse};

/// Replays queued replies in order.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    received: Mutex<Vec<LlmRequest>>,
}

impl ScriptedGenerator {
    /// Empty script; every call fails until replies are queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script that answers with `replies` in order.
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::new();
        for reply in replies {
            generator.push_reply(reply);
        }
        generator
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.script.lock().push_back(Ok(text.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) {
        self.script.lock().push_back(Err(error));
    }

    /// Replies not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }

    /// Prompts received so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.received.lock().iter().map(|r| r.prompt.clone()).collect()
    }

    /// Full requests received so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.received.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmResponse {
                tokens_generated: u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX),
                text,
                latency_ms: 0,
                model: request
                    .params
                    .model_id
                    .clone()
                    .unwrap_or_else(|| "scripted".to_string()),
            }),
            Some(Err(err)) => Err(err),
            None => Err(LlmError::Unavailable("scripted generator has no replies left".into())),
        }
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}
