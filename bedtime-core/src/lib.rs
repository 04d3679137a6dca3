//! # Bedtime Core Library
//!
//! Session state and story rules for an interactive children's storyteller
//! that writes with a hosted language model.
//!
//! Everything here is synchronous and free of network I/O:
//!
//! - **Genre**: keyword classification with continuity and preference bias
//! - **Prompt**: templates and the size-limited prompt builder
//! - **Evaluation**: lenient parsing of judge scores and the revision trigger
//! - **Feedback**: rating thresholds and preference counters
//! - **Character**: character listing parser and name heuristic
//! - **Session**: the single owner of characters, episodes and preferences
//!
//! The generation cycle that calls the model lives in `bedtime-cli`; the
//! model client lives in `bedtime-llm`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod character;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod feedback;
pub mod genre;
pub mod prompt;
pub mod session;
pub mod types;

pub use config::BedtimeConfig;
pub use error::BedtimeError;
pub use evaluation::{QualityEvaluator, QualityReport};
pub use session::{Episode, SessionState};
pub use types::*;
