//! LLM provider settings

use serde::Deserialize;
use thiserror::Error;

/// OpenAI-compatible chat completions endpoint used by the llm planner.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Resolve API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, ApiKeyError> {
        let env_name = self.api_key_env.as_ref().ok_or(ApiKeyError::NotConfigured)?;
        std::env::var(env_name).map_err(|_| ApiKeyError::EnvNotFound(env_name.clone()))
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("API key environment variable not configured")]
    NotConfigured,
    #[error("Environment variable '{0}' not found")]
    EnvNotFound(String),
}
