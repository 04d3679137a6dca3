//! # bedtime-cli: Interactive Storyteller for Bedtime
//!
//! Ties `bedtime-core` (session state and story rules) to `bedtime-llm`
//! (text generation) and puts a console in front of them.
//!
//! ## Modules
//!
//! - `storyteller`: the generate / judge / refine / feedback cycle
//! - `console`: banner, prompts, menu and the interactive loop
//! - `setup`: model client construction from config and environment
//! - `error`: `CliError` and exit codes

pub mod console;
pub mod error;
pub mod setup;
pub mod storyteller;

pub use console::{run_session, Console, MenuChoice};
pub use error::CliError;
pub use setup::client_from_config;
pub use storyteller::{CycleState, FeedbackOutcome, PresentedStory, Storyteller};
