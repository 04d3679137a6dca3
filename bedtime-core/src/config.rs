//! Configuration for the Bedtime storyteller.
//!
//! Maps directly to `bedtime.toml`. Every field has a default, so an empty
//! file (or no file at all) yields a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BedtimeError;
use crate::types::Genre;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BedtimeConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// External text-generation service settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Per-call generation parameters.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Genre classifier weights.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Quality evaluation scale and revision trigger.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Rating thresholds for the feedback loop.
    #[serde(default)]
    pub feedback: FeedbackConfig,
    /// Prompt size limits and template overrides.
    #[serde(default)]
    pub prompt: PromptConfig,
    /// Character tracking.
    #[serde(default)]
    pub characters: CharacterConfig,
    /// Interactive session behavior.
    #[serde(default)]
    pub session: SessionConfig,
}

impl BedtimeConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `BedtimeError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `BedtimeError::Config` describing the first violated constraint.
    pub fn validate(&self) -> crate::error::Result<()> {
        let eval = &self.evaluation;
        if eval.scale_min >= eval.scale_max {
            return Err(BedtimeError::Config(format!(
                "evaluation.scale_min ({}) must be below evaluation.scale_max ({})",
                eval.scale_min, eval.scale_max
            )));
        }
        for (name, value) in [
            ("neutral_score", eval.neutral_score),
            ("revision_threshold", eval.revision_threshold),
            ("dimension_floor", eval.dimension_floor),
        ] {
            if !(eval.scale_min..=eval.scale_max).contains(&value) {
                return Err(BedtimeError::Config(format!(
                    "evaluation.{name} ({value}) is outside the scale {}-{}",
                    eval.scale_min, eval.scale_max
                )));
            }
        }

        let fb = &self.feedback;
        if fb.low_rating_threshold >= fb.high_rating_threshold {
            return Err(BedtimeError::Config(format!(
                "feedback.low_rating_threshold ({}) must be below feedback.high_rating_threshold ({})",
                fb.low_rating_threshold, fb.high_rating_threshold
            )));
        }
        if !(1..=5).contains(&fb.low_rating_threshold) || !(1..=5).contains(&fb.high_rating_threshold) {
            return Err(BedtimeError::Config(
                "feedback rating thresholds must be within 1-5".to_string(),
            ));
        }

        if self.classifier.continuity_bonus < 0.0 || self.classifier.preference_bonus < 0.0 {
            return Err(BedtimeError::Config(
                "classifier bonuses must not be negative".to_string(),
            ));
        }

        if self.prompt.max_prompt_chars < 1000 {
            return Err(BedtimeError::Config(format!(
                "prompt.max_prompt_chars ({}) is too small to hold a story prompt",
                self.prompt.max_prompt_chars
            )));
        }

        if self.llm.retry.backoff_multiplier < 1.0 {
            return Err(BedtimeError::Config(
                "llm.retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level when `RUST_LOG` is unset: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// External service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "openai" (any OpenAI-compatible API), "ollama", or "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL of the provider.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the service credential.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bounded retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            request_timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Whether this provider needs a credential from the environment.
    #[must_use]
    pub fn requires_credential(&self) -> bool {
        matches!(
            self.provider.to_ascii_lowercase().as_str(),
            "openai" | "openai_compatible"
        )
    }
}

/// Automatic retry settings. Zero retries means every failure is surfaced
/// to the user, who may simply re-issue the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Sampling parameters for one kind of call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CallParams {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CallParams {
    const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

/// Parameters for each call the storyteller makes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Story generation.
    #[serde(default = "default_story_params")]
    pub story: CallParams,
    /// Quality evaluation.
    #[serde(default = "default_evaluation_params")]
    pub evaluation: CallParams,
    /// Quality refinement and feedback revision.
    #[serde(default = "default_story_params")]
    pub revision: CallParams,
    /// Character extraction.
    #[serde(default = "default_extraction_params")]
    pub extraction: CallParams,
    /// Episode potential assessment.
    #[serde(default = "default_assessment_params")]
    pub assessment: CallParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            story: default_story_params(),
            evaluation: default_evaluation_params(),
            revision: default_story_params(),
            extraction: default_extraction_params(),
            assessment: default_assessment_params(),
        }
    }
}

/// Genre classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Genre returned when no keyword matches.
    #[serde(default = "default_genre")]
    pub default_genre: Genre,
    /// Bonus for the genre of the previous episode.
    #[serde(default = "default_bonus")]
    pub continuity_bonus: f32,
    /// Bonus for the user's historically preferred genre.
    #[serde(default = "default_bonus")]
    pub preference_bonus: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_genre: default_genre(),
            continuity_bonus: default_bonus(),
            preference_bonus: default_bonus(),
        }
    }
}

/// Quality evaluation scale and revision trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Lowest score on the scale.
    #[serde(default = "default_scale_min")]
    pub scale_min: f32,
    /// Highest score on the scale.
    #[serde(default = "default_scale_max")]
    pub scale_max: f32,
    /// Score substituted for a dimension that could not be parsed.
    #[serde(default = "default_neutral")]
    pub neutral_score: f32,
    /// Aggregate strictly below this triggers revision.
    #[serde(default = "default_revision_threshold")]
    pub revision_threshold: f32,
    /// Any dimension strictly below this triggers revision.
    #[serde(default = "default_dimension_floor")]
    pub dimension_floor: f32,
    /// Refine the story inside the cycle when the trigger holds.
    #[serde(default = "default_true")]
    pub auto_refine: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            scale_min: default_scale_min(),
            scale_max: default_scale_max(),
            neutral_score: default_neutral(),
            revision_threshold: default_revision_threshold(),
            dimension_floor: default_dimension_floor(),
            auto_refine: true,
        }
    }
}

/// Rating thresholds for preferences and feedback revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Ratings at or below this revise the story and decrement the preference.
    #[serde(default = "default_low_rating")]
    pub low_rating_threshold: u8,
    /// Ratings at or above this increment the preference.
    #[serde(default = "default_high_rating")]
    pub high_rating_threshold: u8,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            low_rating_threshold: default_low_rating(),
            high_rating_threshold: default_high_rating(),
        }
    }
}

/// Prompt assembly limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Hard cap on prompt length, in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Tail of each prior episode included as continuation context.
    #[serde(default = "default_context_chars")]
    pub context_chars_per_episode: usize,
    /// How many prior episodes of the series may be included.
    #[serde(default = "default_context_episodes")]
    pub max_context_episodes: usize,
    /// Directory of TOML template overrides.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            context_chars_per_episode: default_context_chars(),
            max_context_episodes: default_context_episodes(),
            prompts_dir: None,
        }
    }
}

/// Character tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    /// Ask the model for a structured character listing.
    #[serde(default = "default_true")]
    pub llm_extraction: bool,
    /// Scan story text for capitalized names.
    #[serde(default = "default_true")]
    pub name_heuristic: bool,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            llm_extraction: true,
            name_heuristic: true,
        }
    }
}

/// Interactive session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Ask the model whether a story can carry further episodes before
    /// offering "continue".
    #[serde(default = "default_true")]
    pub assess_episode_potential: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            assess_episode_potential: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "warn".to_string() }
fn default_provider() -> String { "openai".to_string() }
fn default_base_url() -> String { "https://api.openai.com".to_string() }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_timeout_ms() -> u64 { 60_000 }
fn default_backoff_ms() -> u64 { 500 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_story_params() -> CallParams { CallParams::new(3000, 0.1) }
fn default_evaluation_params() -> CallParams { CallParams::new(1000, 0.1) }
fn default_extraction_params() -> CallParams { CallParams::new(500, 0.1) }
fn default_assessment_params() -> CallParams { CallParams::new(100, 0.1) }
fn default_genre() -> Genre { Genre::Adventure }
fn default_bonus() -> f32 { 0.5 }
fn default_scale_min() -> f32 { 1.0 }
fn default_scale_max() -> f32 { 10.0 }
fn default_neutral() -> f32 { 5.0 }
fn default_revision_threshold() -> f32 { 7.0 }
fn default_dimension_floor() -> f32 { 5.0 }
fn default_low_rating() -> u8 { 2 }
fn default_high_rating() -> u8 { 4 }
fn default_max_prompt_chars() -> usize { 12_000 }
fn default_context_chars() -> usize { 1_500 }
fn default_context_episodes() -> usize { 3 }
