//! Command Dispatcher
//!
//! Turns one raw utterance into exactly one `Reply`. Rules are evaluated in
//! the fixed order of `RuleKind::ORDER`; the first match answers. Only the
//! language-model rules (`AskModel`, `IntentFallback`, `Completion`) write
//! to memory, and they always store the raw input, before any translation.
//!
//! Every collaborator failure is turned into a short sentence. Nothing here
//! returns an error to the session loop.

pub mod clock;
pub mod rules;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, ScriptRange};
use crate::gateway::{reply_json, GatewayError, OperationGateway};
use crate::llm::{parse_json_object, CompletionClient, NOT_CONFIGURED_REPLY};
use crate::memory::MemoryStore;
use crate::platform::{AppLauncher, AppTarget, LaunchError};
use crate::search::{SearchProvider, SummaryFetcher};
use crate::translate::{contains_script, Translator};
use sdk::errors::{EngineError, SophieErrorExt};
use sdk::types::OperationSpec;

pub use clock::{Clock, FixedClock, SystemClock};
pub use rules::RuleKind;

pub const EMPTY_REPLY: &str = "I didn't hear anything.";
pub const EXIT_REPLY: &str = "Goodbye. Take care.";
pub const SPREADSHEET_USAGE: &str = "I couldn't parse the Excel command. Use: excel: {json-spec}";
pub const SEARCH_NOT_CONFIGURED: &str = "Search is not configured.";
pub const EMPTY_PROMPT_REPLY: &str = "Provide a prompt after 'gpt:'";

const ASK_MAX_TOKENS: u32 = 350;
const INTENT_MAX_TOKENS: u32 = 120;
const COMPLETION_MAX_TOKENS: u32 = 250;
const NEWS_RESULTS: usize = 2;
const SEARCH_RESULTS: usize = 3;
const SUMMARY_PARAGRAPHS: usize = 2;

/// The answer to one utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    pub rule: RuleKind,
    /// The session must end once this reply is delivered
    pub terminate: bool,
}

impl Reply {
    fn new(rule: RuleKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rule,
            terminate: false,
        }
    }
}

/// Matching settings taken from configuration
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub exit_phrases: Vec<String>,
    pub script_ranges: Vec<ScriptRange>,
    pub source_hint: String,
    pub target_language: String,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exit_phrases: config.session.exit_phrases.clone(),
            script_ranges: config.translate.script_ranges.clone(),
            source_hint: config.translate.source_hint.clone(),
            target_language: config.translate.target.clone(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Search plus the summary fetcher used for the first hit
#[derive(Clone)]
pub struct WebTools {
    pub search: Arc<dyn SearchProvider>,
    pub summaries: Arc<dyn SummaryFetcher>,
}

/// External collaborators; `None` means not configured
#[derive(Clone)]
pub struct Collaborators {
    pub llm: CompletionClient,
    pub web: Option<WebTools>,
    pub translator: Option<Arc<dyn Translator>>,
    pub launcher: Arc<dyn AppLauncher>,
    pub clock: Arc<dyn Clock>,
}

pub struct Dispatcher {
    settings: DispatchSettings,
    collaborators: Collaborators,
    gateway: Arc<OperationGateway>,
    memory: Arc<Mutex<MemoryStore>>,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        collaborators: Collaborators,
        gateway: OperationGateway,
        memory: MemoryStore,
    ) -> Self {
        Self {
            settings,
            collaborators,
            gateway: Arc::new(gateway),
            memory: Arc::new(Mutex::new(memory)),
        }
    }

    /// Shared handle to the conversation memory
    pub fn memory(&self) -> Arc<Mutex<MemoryStore>> {
        Arc::clone(&self.memory)
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Resolve one raw utterance
    pub async fn dispatch(&self, raw: &str) -> Reply {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Reply::new(RuleKind::Empty, EMPTY_REPLY);
        }

        let lowered = trimmed.to_lowercase();
        if self.settings.exit_phrases.iter().any(|p| *p == lowered) {
            info!("Exit phrase received");
            return Reply {
                text: EXIT_REPLY.to_string(),
                rule: RuleKind::Exit,
                terminate: true,
            };
        }

        let text = self.normalize_script(trimmed).await;
        let lowered = text.to_lowercase();
        let rule = RuleKind::classify_command(&text, &lowered);
        debug!("Input matched rule {}", rule);

        let reply_text = match rule {
            RuleKind::Spreadsheet => self.spreadsheet(&text).await,
            RuleKind::OpenApp => self.open_app(&lowered),
            RuleKind::Clock => self.clock(&lowered),
            RuleKind::News => self.news(&text).await,
            RuleKind::WebSearch => self.web_search(&text).await,
            RuleKind::AskModel => self.ask_model(raw, &text).await,
            RuleKind::IntentFallback => self.intent_fallback(raw, &text).await,
            _ => self.completion(raw, &text).await,
        };

        Reply::new(rule, reply_text)
    }

    /// Translate input written in a configured script; fall back to the
    /// original text on any failure
    async fn normalize_script(&self, text: &str) -> String {
        let Some(translator) = &self.collaborators.translator else {
            return text.to_string();
        };
        if !contains_script(text, &self.settings.script_ranges) {
            return text.to_string();
        }

        match translator
            .translate(text, &self.settings.source_hint, &self.settings.target_language)
            .await
        {
            Ok(translated) => {
                debug!("Translated input -> {:?}", translated);
                translated
            }
            Err(e) => {
                debug!("Translation failed, matching original text: {}", e);
                text.to_string()
            }
        }
    }

    async fn spreadsheet(&self, text: &str) -> String {
        let spec: OperationSpec = match serde_json::from_str(rules::after_colon(text)) {
            Ok(spec) => spec,
            Err(e) => {
                debug!("Spreadsheet command did not parse: {}", e);
                return SPREADSHEET_USAGE.to_string();
            }
        };

        let gateway = Arc::clone(&self.gateway);
        let result = tokio::task::spawn_blocking(move || gateway.execute(&spec))
            .await
            .unwrap_or_else(|e| Err(GatewayError::Internal(format!("operation aborted: {}", e))));

        if let Err(e) = &result {
            let err = EngineError::from(e.clone());
            warn!("Spreadsheet operation failed: {}. {}", err, err.user_hint());
        }

        reply_json(&result).to_string()
    }

    fn open_app(&self, lowered: &str) -> String {
        let Some(target) = AppTarget::from_phrase(lowered) else {
            return "I couldn't open that application.".to_string();
        };

        match self.collaborators.launcher.launch(target) {
            Ok(()) => match target {
                AppTarget::Browser => "Opened browser.".to_string(),
                app => format!("Opened {}.", app),
            },
            Err(LaunchError::Unsupported(app)) => {
                format!("{} command works only on Windows.", app)
            }
            Err(e) => {
                warn!("{}", e);
                "I couldn't open that application.".to_string()
            }
        }
    }

    fn clock(&self, lowered: &str) -> String {
        let now = self.collaborators.clock.now();
        if lowered.contains("time") {
            clock::time_reply(now)
        } else {
            clock::date_reply(now)
        }
    }

    async fn news(&self, text: &str) -> String {
        let Some(web) = &self.collaborators.web else {
            return SEARCH_NOT_CONFIGURED.to_string();
        };

        let query = rules::news_query(text);
        match web.search.search(&query, NEWS_RESULTS).await {
            Ok(hits) if hits.is_empty() => "I couldn't find any news on that.".to_string(),
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .enumerate()
                    .map(|(i, hit)| format!("{}. {}", i + 1, hit.title))
                    .collect();
                format!("Here are top results: {}", lines.join(" | "))
            }
            Err(e) => {
                warn!("News search failed: {}", e);
                "I couldn't fetch news right now.".to_string()
            }
        }
    }

    async fn web_search(&self, text: &str) -> String {
        let Some(web) = &self.collaborators.web else {
            return SEARCH_NOT_CONFIGURED.to_string();
        };

        let query = rules::search_query(text);
        let hits = match web.search.search(query, SEARCH_RESULTS).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Web search failed: {}", e);
                return "Search failed.".to_string();
            }
        };

        let Some(first) = hits.first() else {
            return "No results found.".to_string();
        };

        let summary = web.summaries.summarize(&first.href, SUMMARY_PARAGRAPHS).await;
        format!("{} - {}", first.title, summary)
    }

    async fn ask_model(&self, raw: &str, text: &str) -> String {
        let prompt = rules::after_colon(text);
        if prompt.is_empty() {
            return EMPTY_PROMPT_REPLY.to_string();
        }
        if !self.collaborators.llm.is_configured() {
            return NOT_CONFIGURED_REPLY.to_string();
        }

        let answer = self.collaborators.llm.complete(prompt, ASK_MAX_TOKENS).await;
        self.remember(raw, &answer).await;
        answer
    }

    async fn intent_fallback(&self, raw: &str, text: &str) -> String {
        if !self.collaborators.llm.is_configured() {
            return NOT_CONFIGURED_REPLY.to_string();
        }

        let prompt = intent_prompt(text);
        let response = self.collaborators.llm.complete(&prompt, INTENT_MAX_TOKENS).await;

        let Some(parsed) = parse_json_object(&response) else {
            self.remember(raw, &response).await;
            return response;
        };

        let field = |key: &str| {
            parsed
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let intent = field("intent");
        let action = field("action");

        // Suggested launches are only described, never executed.
        if action.to_lowercase().starts_with("open ") {
            return format!("Intent: {}. Action recommended: {}", intent, action);
        }

        self.remember(raw, &response).await;
        format!("Intent detected: {}. Suggestion: {}", intent, action)
    }

    async fn completion(&self, raw: &str, text: &str) -> String {
        if !self.collaborators.llm.is_configured() {
            return NOT_CONFIGURED_REPLY.to_string();
        }

        let prompt = format!("Answer concisely: {}", text);
        let answer = self.collaborators.llm.complete(&prompt, COMPLETION_MAX_TOKENS).await;
        self.remember(raw, &answer).await;
        answer
    }

    async fn remember(&self, user: &str, assistant: &str) {
        self.memory.lock().await.append(user, assistant);
    }
}

/// Classification prompt for short free-form input
pub fn intent_prompt(text: &str) -> String {
    format!(
        "You are a concise intent classifier. Provide a one-line summary intent and one-line action for this user input:\n\
         User Input: \"{}\"\n\
         Respond in JSON: {{ \"intent\": \"...\", \"action\": \"...\" }}",
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMProvider, Result as LLMResult};
    use crate::platform::SystemLauncher;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Canned(&'static str);

    #[async_trait]
    impl LLMProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> LLMResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn dispatcher(dir: &TempDir, llm: CompletionClient) -> Dispatcher {
        let collaborators = Collaborators {
            llm,
            web: None,
            translator: None,
            launcher: Arc::new(SystemLauncher),
            clock: Arc::new(SystemClock),
        };
        Dispatcher::new(
            DispatchSettings::default(),
            collaborators,
            OperationGateway::new(),
            MemoryStore::new(dir.path().join("memory.json"), 200),
        )
    }

    #[test]
    fn test_intent_prompt_text() {
        let prompt = intent_prompt("play music");
        assert!(prompt.starts_with("You are a concise intent classifier."));
        assert!(prompt.contains("User Input: \"play music\""));
        assert!(prompt.ends_with("Respond in JSON: { \"intent\": \"...\", \"action\": \"...\" }"));
    }

    #[tokio::test]
    async fn test_unconfigured_model_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, CompletionClient::unconfigured());

        let reply = d.dispatch("gpt: hello").await;
        assert_eq!(reply.text, NOT_CONFIGURED_REPLY);
        assert_eq!(reply.rule, RuleKind::AskModel);
        assert!(d.memory().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_search_not_configured() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(&dir, CompletionClient::unconfigured());
        assert_eq!(d.dispatch("search rust").await.text, SEARCH_NOT_CONFIGURED);
        assert_eq!(d.dispatch("news").await.text, SEARCH_NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn test_open_action_is_advisory() {
        let dir = TempDir::new().unwrap();
        let llm = CompletionClient::new(
            Arc::new(Canned(r#"{"intent": "launch", "action": "Open Spotify"}"#)),
            Duration::from_secs(1),
        );
        let d = dispatcher(&dir, llm);

        let reply = d.dispatch("play some music").await;
        assert_eq!(reply.text, "Intent: launch. Action recommended: Open Spotify");
        assert!(d.memory().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_memory_stores_raw_input() {
        let dir = TempDir::new().unwrap();
        let llm = CompletionClient::new(Arc::new(Canned("Paris.")), Duration::from_secs(1));
        let d = dispatcher(&dir, llm);

        let reply = d.dispatch("  ask: capital of France?  ").await;
        assert_eq!(reply.text, "Paris.");

        let memory = d.memory();
        let memory = memory.lock().await;
        assert_eq!(memory.entries()[0].user, "  ask: capital of France?  ");
        assert_eq!(memory.entries()[0].assistant, "Paris.");
    }
}
