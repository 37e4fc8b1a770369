//! Language Model Provider Layer
//!
//! A narrow completion interface over the supported providers (OpenAI chat
//! completions and a local Ollama server). The dispatcher never talks to a
//! provider directly; it goes through `CompletionClient`, which bounds every
//! call with a timeout and turns failures into short user-facing sentences.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LLMConfig;
use crate::secrets::{scrub, SecretManager, OPENAI_KEY};
use sdk::errors::{EngineError, SophieErrorExt};

pub mod ollama;
pub mod openai;

pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Complete a single-turn prompt
    ///
    /// # Arguments
    /// * `prompt` - The full user prompt
    /// * `max_tokens` - Upper bound on the completion length
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Reply used when no provider could be built
pub const NOT_CONFIGURED_REPLY: &str = "The language model is not configured.";

/// Reply used when a completion exceeds its time budget
pub const TIMEOUT_REPLY: &str = "The language model took too long to respond.";

/// Fail-soft wrapper around an optional provider
///
/// `complete` never errors: timeouts and provider failures become short
/// sentences the dispatcher can speak back. Secrets are scrubbed from any
/// provider error before it is shown.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Option<Arc<dyn LLMProvider>>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// A client with no provider; every completion answers `NOT_CONFIGURED_REPLY`
    pub fn unconfigured() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Build the configured provider, or an unconfigured client if its
    /// credentials are missing
    pub fn from_config(config: &LLMConfig, secrets: &SecretManager) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        match build_provider(config, secrets) {
            Ok(provider) => Self::new(provider, timeout),
            Err(e) => {
                warn!("Language model disabled: {}. {}", e, e.user_hint());
                Self::unconfigured()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    pub async fn check_health(&self) -> bool {
        match &self.provider {
            Some(provider) => provider.check_health().await,
            None => false,
        }
    }

    /// Complete `prompt`, never failing
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> String {
        let Some(provider) = &self.provider else {
            return NOT_CONFIGURED_REPLY.to_string();
        };

        debug!(
            "Completion request: provider={}, max_tokens={}, chars={}",
            provider.name(),
            max_tokens,
            prompt.len()
        );

        let failure = match tokio::time::timeout(self.timeout, provider.complete(prompt, max_tokens))
            .await
        {
            Ok(Ok(text)) => return text,
            Ok(Err(LLMError::Timeout)) | Err(_) => EngineError::Timeout(format!(
                "{} after {:?}",
                provider.name(),
                self.timeout
            )),
            Ok(Err(e)) => EngineError::TransientService(scrub(&e.to_string())),
        };

        warn!("{} completion failed: {}", provider.name(), failure);
        failure_reply(&failure)
    }
}

/// The sentence a failed completion is answered with
fn failure_reply(err: &EngineError) -> String {
    match err {
        EngineError::Timeout(_) => TIMEOUT_REPLY.to_string(),
        EngineError::TransientService(reason) => {
            format!("Error contacting the language model: {}", reason)
        }
        other => format!("Error contacting the language model: {}", other),
    }
}

/// Build the provider named by `config.provider`
///
/// # Errors
/// `EngineError::MissingCredential` when the OpenAI key is not set,
/// `EngineError::KeyringError` when the keychain fails, and
/// `EngineError::Config` for an unknown provider.
pub fn build_provider(
    config: &LLMConfig,
    secrets: &SecretManager,
) -> std::result::Result<Arc<dyn LLMProvider>, EngineError> {
    match config.provider.as_str() {
        "openai" => {
            let (key, env_var) = OPENAI_KEY;
            let api_key = secrets
                .lookup(key, env_var)?
                .ok_or_else(|| EngineError::MissingCredential(env_var.to_string()))?;
            Ok(Arc::new(OpenAIProvider::new(config.openai.clone(), api_key)))
        }
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            config.ollama.base_url.clone(),
            config.ollama.model.clone(),
        ))),
        other => Err(EngineError::Config(format!("unknown provider '{}'", other))),
    }
}

/// Pull a JSON object out of free-form model output.
///
/// Handles the shapes models actually produce:
/// 1. The whole body is a JSON object
/// 2. A fenced block (with or without trailing prose): ` ```json\n{...}\n``` `
/// 3. An object embedded in prose; the first balanced `{...}` is used
pub fn parse_json_object(content: &str) -> Option<Map<String, Value>> {
    let trimmed = content.trim();

    if let Some(obj) = try_parse_object(trimmed) {
        return Some(obj);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(obj) = try_parse_object(inner.trim()) {
            return Some(obj);
        }
    }

    let pos = trimmed.find('{')?;
    extract_balanced_json(&trimmed[pos..]).and_then(try_parse_object)
}

fn try_parse_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
