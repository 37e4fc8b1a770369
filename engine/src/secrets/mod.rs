//! Credential lookup for collaborator adapters
//!
//! Credentials are resolved without prompting, because a voice session has
//! nobody at a keyboard:
//!
//! 1. The environment variable (e.g. `OPENAI_API_KEY`)
//! 2. The OS keychain under the `sophie` service
//!
//! A missing credential is not an error at startup. The collaborator that
//! needs it is simply disabled and its commands answer with a configuration
//! message.

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::fmt;
use std::sync::OnceLock;

/// Keychain service name
pub const SERVICE_NAME: &str = "sophie";

/// Keychain key and environment variable of the OpenAI credential
pub const OPENAI_KEY: (&str, &str) = ("openai_api_key", "OPENAI_API_KEY");

/// A wrapper for sensitive string data that prevents accidental logging.
///
/// `Debug` and `Display` always print `[REDACTED]`; use `unsecure()` to
/// reach the raw value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Resolves credentials from the environment and the OS keychain
pub struct SecretManager {
    service_name: String,
}

impl SecretManager {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Look up a credential, environment first, keychain second
    ///
    /// Returns `Ok(None)` when neither source has a non-empty value.
    ///
    /// # Errors
    /// Returns `EngineError::KeyringError` if the keychain itself fails.
    pub fn lookup(&self, key: &str, env_var: &str) -> Result<Option<SecretString>, EngineError> {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                tracing::debug!("Using secret '{}' from ${}", key, env_var);
                return Ok(Some(SecretString::new(value)));
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) if !secret.trim().is_empty() => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(SecretString::new(secret.trim())))
            }
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [r"sk-[a-zA-Z0-9\-_]{20,}", r"Bearer\s+[^\s]{20,}"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Replace API keys and bearer tokens in `text` with `[REDACTED]`
///
/// Provider error bodies can echo the request's credentials, and those
/// bodies end up in spoken replies and logs.
///
/// ```
/// use sophie_engine::secrets::scrub;
///
/// assert_eq!(
///     scrub("bad key sk-1234567890abcdefghijklmnop"),
///     "bad key [REDACTED]"
/// );
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}
