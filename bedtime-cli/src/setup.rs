//! Building the model client from configuration and the environment.

use bedtime_core::config::LlmConfig;
use bedtime_llm::{LlmClient, LlmProvider, RetryPolicy};
use tracing::info;

use crate::error::CliError;

/// Build the client, reading the credential from the process environment.
///
/// # Errors
/// Returns [`CliError::MissingCredential`] when the provider needs a key and
/// the configured variable is unset or empty.
pub fn client_from_config(config: &LlmConfig) -> Result<LlmClient, CliError> {
    client_from_config_with(config, |name| std::env::var(name).ok())
}

/// Build the client with an explicit environment lookup.
///
/// # Errors
/// See [`client_from_config`]; also fails for an unknown provider name.
pub fn client_from_config_with<F>(config: &LlmConfig, lookup: F) -> Result<LlmClient, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = lookup(&config.api_key_env).filter(|k| !k.trim().is_empty());
    if config.requires_credential() && api_key.is_none() {
        return Err(CliError::MissingCredential(config.api_key_env.clone()));
    }

    let provider = LlmProvider::from_name(&config.provider, &config.base_url, api_key)?;
    let retry = RetryPolicy::new(
        config.retry.max_retries,
        config.retry.initial_backoff_ms,
        config.retry.backoff_multiplier,
    );
    info!(
        provider = %config.provider,
        model = %config.model,
        max_retries = retry.max_retries,
        "LLM client configured"
    );
    Ok(LlmClient::new(provider, config.model.clone(), retry))
}
