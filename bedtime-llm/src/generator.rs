//! The text generation capability the storyteller depends on.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Anything that turns a prompt into text.
///
/// [`LlmClient`](crate::LlmClient) talks to a real provider;
/// [`ScriptedGenerator`](crate::ScriptedGenerator) replays canned replies.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `request`.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Short name of the backend, for logs.
    fn backend_name(&self) -> &str;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).generate(request).await
    }

    fn backend_name(&self) -> &str {
        (**self).backend_name()
    }
}
