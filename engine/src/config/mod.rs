//! Configuration management
//!
//! This module handles loading, validation, and management of the Sophie configuration.
//! Configuration is stored in TOML format at ~/.sophie/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **session**: Interaction mode, wake word, exit phrases, ambient trigger policy
//! - **memory**: Conversation log location and rotation size
//! - **llm**: Language model provider settings
//! - **search**: Web search and page summary settings
//! - **translate**: Script detection and translation settings
//! - **speech**: External speech capture and speech output commands
//!
//! Every section has defaults, so an empty file is a valid configuration.
//!
//! # Environment Overrides
//!
//! - `SOPHIE_MEMORY_FILE` replaces `memory.file`
//! - `OPENAI_MODEL` replaces `llm.openai.model`
//!
//! # Examples
//!
//! ```no_run
//! use sophie_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Wake word: {}", config.session.wake_word);
//! println!("Memory file: {:?}", config.memory.file);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Session loop settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Language model settings
    #[serde(default)]
    pub llm: LLMConfig,

    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Translation settings
    #[serde(default)]
    pub translate: TranslateConfig,

    /// Speech capture and output settings
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// Which input channels the session listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Spoken input only, gated by the wake word
    Voice,
    /// Typed input only
    Text,
    /// Both channels; typed input wins when both arrive in the same cycle
    Both,
}

impl Mode {
    pub fn uses_voice(self) -> bool {
        matches!(self, Mode::Voice | Mode::Both)
    }

    pub fn uses_text(self) -> bool {
        matches!(self, Mode::Text | Mode::Both)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Voice => write!(f, "voice"),
            Mode::Text => write!(f, "text"),
            Mode::Both => write!(f, "both"),
        }
    }
}

/// Session loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interaction mode
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Wake word for voice mode (normalized to lowercase on load)
    #[serde(default = "default_wake_word")]
    pub wake_word: String,

    /// Inputs that end the session (exact, case-insensitive)
    #[serde(default = "default_exit_phrases")]
    pub exit_phrases: Vec<String>,

    /// Short utterances that bypass the wake word in `both` mode
    #[serde(default)]
    pub ambient: AmbientConfig,

    /// Capture window used while waiting for the wake word
    #[serde(default = "default_wake_window")]
    pub wake_window: ListenWindow,

    /// Capture window used for the command after the wake word
    #[serde(default = "default_command_window")]
    pub command_window: ListenWindow,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            wake_word: default_wake_word(),
            exit_phrases: default_exit_phrases(),
            ambient: AmbientConfig::default(),
            wake_window: default_wake_window(),
            command_window: default_command_window(),
        }
    }
}

/// Ambient trigger policy
///
/// In `both` mode an utterance without the wake word is still dispatched
/// when it has at most `max_words` words and contains one of `triggers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbientConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ambient_max_words")]
    pub max_words: usize,

    #[serde(default = "default_ambient_triggers")]
    pub triggers: Vec<String>,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: default_ambient_max_words(),
            triggers: default_ambient_triggers(),
        }
    }
}

/// Speech capture limits in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListenWindow {
    /// How long to wait for speech to start
    pub timeout_secs: f64,

    /// Maximum length of one phrase
    pub phrase_limit_secs: f64,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path of the JSON conversation log (supports ~ expansion)
    #[serde(default = "default_memory_file")]
    pub file: PathBuf,

    /// Maximum number of remembered exchanges
    #[serde(default = "default_memory_max_items")]
    pub max_items: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            file: default_memory_file(),
            max_items: default_memory_max_items(),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider to use (openai, ollama)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Upper bound for a single completion call
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            timeout_secs: default_llm_timeout(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    // Note: API key comes from OPENAI_API_KEY or the OS keychain, not from config
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Enable the news and search commands
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTML search endpoint
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Per-request timeout for search and summary fetches
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// User agent sent with search and summary requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_search_base_url(),
            timeout_secs: default_search_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Enable script normalization
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Translation endpoint
    #[serde(default = "default_translate_base_url")]
    pub base_url: String,

    /// Source language hint passed to the translator
    #[serde(default = "default_source_hint")]
    pub source_hint: String,

    /// Working language of the dispatcher
    #[serde(default = "default_target_language")]
    pub target: String,

    /// Request timeout
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Unicode ranges that trigger translation
    #[serde(default = "default_script_ranges")]
    pub script_ranges: Vec<ScriptRange>,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_translate_base_url(),
            source_hint: default_source_hint(),
            target: default_target_language(),
            timeout_secs: default_search_timeout(),
            script_ranges: default_script_ranges(),
        }
    }
}

/// Inclusive range of Unicode scalar values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRange {
    pub start: u32,
    pub end: u32,
}

impl ScriptRange {
    pub fn contains(&self, ch: char) -> bool {
        (self.start..=self.end).contains(&(ch as u32))
    }
}

/// Speech collaborator configuration
///
/// Both commands are argv lists run without a shell. The TTS command gets
/// the text appended as its final argument. The capture command must print
/// the recognized transcript on stdout and receives the listen window through
/// `SOPHIE_LISTEN_TIMEOUT` and `SOPHIE_PHRASE_LIMIT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech output command, e.g. ["espeak", "-s", "180"]
    #[serde(default)]
    pub tts_command: Vec<String>,

    /// Speech capture command
    #[serde(default)]
    pub stt_command: Vec<String>,

    /// Upper bound for one spoken response
    #[serde(default = "default_tts_timeout")]
    pub tts_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_command: Vec::new(),
            stt_command: Vec::new(),
            tts_timeout_secs: default_tts_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.sophie")
}

fn default_mode() -> Mode {
    Mode::Both
}

fn default_wake_word() -> String {
    "sophie".to_string()
}

fn default_exit_phrases() -> Vec<String> {
    ["exit", "quit", "goodbye", "bye", "stop"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ambient_max_words() -> usize {
    3
}

fn default_ambient_triggers() -> Vec<String> {
    ["time", "date", "hello", "hi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_wake_window() -> ListenWindow {
    ListenWindow {
        timeout_secs: 5.0,
        phrase_limit_secs: 6.0,
    }
}

fn default_command_window() -> ListenWindow {
    ListenWindow {
        timeout_secs: 8.0,
        phrase_limit_secs: 12.0,
    }
}

fn default_memory_file() -> PathBuf {
    PathBuf::from("~/.sophie/memory.json")
}

fn default_memory_max_items() -> usize {
    200
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_search_base_url() -> String {
    "https://duckduckgo.com/html/".to_string()
}

fn default_search_timeout() -> u64 {
    6
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_translate_base_url() -> String {
    "https://translate.googleapis.com/translate_a/single".to_string()
}

fn default_source_hint() -> String {
    "hi".to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_script_ranges() -> Vec<ScriptRange> {
    // Devanagari
    vec![ScriptRange {
        start: 0x0900,
        end: 0x097F,
    }]
}

fn default_tts_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default location (~/.sophie/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, apply environment overrides and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Apply the command-line mode and wake word, which win over the file
    pub fn with_cli_overrides(
        mut self,
        mode: Option<Mode>,
        wake_word: Option<String>,
    ) -> Result<Self, EngineError> {
        if let Some(mode) = mode {
            self.session.mode = mode;
        }
        if let Some(wake_word) = wake_word {
            self.session.wake_word = normalize_wake_word(&wake_word)?;
        }
        Ok(self)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let defaults = Self::default();

        let toml_string = toml::to_string_pretty(&defaults)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = defaults;
        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.sophie/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".sophie").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(file) = std::env::var("SOPHIE_MEMORY_FILE") {
            if !file.trim().is_empty() {
                self.memory.file = PathBuf::from(file);
            }
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.openai.model = model;
            }
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated fields and numeric bounds
    /// - Normalizes the wake word and exit phrases to lowercase
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.memory.max_items == 0 {
            return Err(EngineError::Config(
                "memory.max_items must be at least 1".to_string(),
            ));
        }

        self.session.wake_word = normalize_wake_word(&self.session.wake_word)?;

        self.session.exit_phrases = self
            .session
            .exit_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        self.session.ambient.triggers = self
            .session
            .ambient
            .triggers
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        for window in [self.session.wake_window, self.session.command_window] {
            let valid = |secs: f64| secs.is_finite() && secs > 0.0;
            if !valid(window.timeout_secs) || !valid(window.phrase_limit_secs) {
                return Err(EngineError::Config(
                    "listen windows must be positive and finite".to_string(),
                ));
            }
        }

        for range in &self.translate.script_ranges {
            if range.start > range.end {
                return Err(EngineError::Config(format!(
                    "Invalid script range {:#x}..{:#x}",
                    range.start, range.end
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.memory.file = expand_path(&self.memory.file)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Lowercase and trim a wake word, rejecting empty ones
pub fn normalize_wake_word(raw: &str) -> Result<String, EngineError> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(EngineError::Config(
            "wake word must not be empty".to_string(),
        ));
    }
    Ok(normalized)
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
