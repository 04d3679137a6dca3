//! # bedtime-llm: LLM Abstraction Layer for Bedtime
//!
//! Provides a single text-generation interface over hosted models:
//!   - **OpenAI-compatible API** (default; `/v1/chat/completions`)
//!   - **Ollama** (local; `/api/generate`)
//!
//! All model calls in Bedtime go through the [`TextGenerator`] trait, which
//! gives:
//!   - Per-request timeout and sampling parameters
//!   - Explicit, bounded retry ([`RetryPolicy`], off by default)
//!   - Provider status codes surfaced as [`LlmError::Status`]
//!
//! [`ScriptedGenerator`] is a deterministic stand-in for tests.

pub mod client;
pub mod error;
pub mod generator;
pub mod retry;
pub mod scripted;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use generator::TextGenerator;
pub use retry::RetryPolicy;
pub use scripted::ScriptedGenerator;
pub use types::{GenerationParams, LlmRequest, LlmResponse};
