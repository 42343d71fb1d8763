//! Configuration consumed by the pipeline — provider credential, model
//! id, optional extra prompt text. The core reads these; it never owns
//! a settings store of its own.
//!
//! Credential resolution order:
//!   1. OS keychain (service "glint", user "anthropic")
//!   2. `ANTHROPIC_API_KEY` environment variable (`.env` honored via dotenvy)

use crate::error::PipelineError;

const KEYRING_SERVICE: &str = "glint";
const KEYRING_USER: &str = "anthropic";

/// Per-request configuration handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model: String,
    /// Free-text instructions the user appended in settings; folded into
    /// the composed prompt on every request.
    pub custom_prompt: Option<String>,
    /// Explicit credential override; `None` resolves keychain/env at
    /// request time so a key added mid-session is picked up.
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: crate::orchestrator::prompts::DEFAULT_MODEL.to_string(),
            custom_prompt: None,
            api_key: None,
        }
    }
}

/// Resolve the provider API key, keychain first, env second.
pub fn resolve_api_key() -> Result<String, PipelineError> {
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
        if let Ok(key) = entry.get_password() {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
    }

    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(PipelineError::CredentialMissing),
    }
}

/// Store the API key in the OS keychain.
pub fn store_api_key(key: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .map_err(|e| format!("Keychain unavailable: {}", e))?;
    entry
        .set_password(key.trim())
        .map_err(|e| format!("Failed to store API key: {}", e))?;
    log::info!("[CONFIG] API key stored in keychain");
    Ok(())
}

/// True if a credential can currently be resolved.
pub fn has_api_key() -> bool {
    resolve_api_key().is_ok()
}
