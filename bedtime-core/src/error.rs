//! Error types for the Bedtime core library.

use thiserror::Error;

/// Top-level error type for all core operations.
#[derive(Error, Debug)]
pub enum BedtimeError {
    /// Configuration is missing, invalid, or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rating outside the 1-5 range was supplied.
    #[error("Invalid rating: {0} (expected 1-5)")]
    InvalidRating(i64),

    /// A genre name did not match any known genre.
    #[error("Unknown genre: '{0}'")]
    UnknownGenre(String),

    /// A prompt template could not be loaded or rendered.
    #[error("Prompt template error: {0}")]
    Template(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for BedtimeError {
    fn from(err: toml::de::Error) -> Self {
        BedtimeError::Config(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, BedtimeError>;
