//! Error types for the storyteller console.

use bedtime_core::BedtimeError;
use bedtime_llm::LlmError;
use thiserror::Error;

/// Errors surfaced by the console and the binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration or other core failure.
    #[error(transparent)]
    Core(#[from] BedtimeError),

    /// The text generation service failed.
    #[error("Story service error: {0}")]
    Llm(#[from] LlmError),

    /// The credential environment variable is unset or empty.
    #[error("Missing API key: set the {0} environment variable (or add it to a .env file)")]
    MissingCredential(String),

    /// Console I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error: 2 for configuration problems
    /// detected before the session starts, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingCredential(_) | Self::Core(BedtimeError::Config(_) | BedtimeError::Template(_)) => 2,
            Self::Llm(LlmError::ConfigError(_)) => 2,
            Self::Core(_) | Self::Llm(_) | Self::Io(_) => 1,
        }
    }
}
