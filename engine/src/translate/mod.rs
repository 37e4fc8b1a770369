//! Script normalization
//!
//! Input written in a configured script (Devanagari by default) is
//! translated to the dispatcher's working language before command matching.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ScriptRange, TranslateConfig};

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Translation endpoint returned {0}")]
    Status(u16),

    #[error("Unexpected translation response: {0}")]
    Parse(String),
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_hint: &str, target: &str)
        -> Result<String, TranslateError>;
}

/// True if any character of `text` falls inside one of `ranges`
pub fn contains_script(text: &str, ranges: &[ScriptRange]) -> bool {
    text.chars().any(|ch| ranges.iter().any(|r| r.contains(ch)))
}

/// Client for the public `translate_a/single` endpoint
pub struct GoogleTranslator {
    base_url: String,
    client: Client,
}

impl GoogleTranslator {
    pub fn new(config: &TranslateConfig) -> Result<Self, TranslateError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranslateError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source_hint: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("client", "gtx"),
                ("sl", source_hint),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| TranslateError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslateError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TranslateError::Parse(e.to_string()))?;

        parse_translation(&body)
    }
}

/// Join the translated segments of a `translate_a/single` response
///
/// The body looks like `[[["translated", "source", ...], ...], null, "hi", ...]`.
fn parse_translation(body: &Value) -> Result<String, TranslateError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::Parse("missing segment list".into()))?;

    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(TranslateError::Parse("empty translation".into()));
    }
    Ok(text.trim().to_string())
}
