//! Speech capture and output
//!
//! Speech is delegated to external commands so the engine carries no audio
//! stack of its own. A capture command records one utterance and prints the
//! transcript; a TTS command speaks its last argument.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{ListenWindow, SpeechConfig};

/// Slack added on top of a listen window before a capture is abandoned
pub const CAPTURE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("No {0} command configured")]
    NotConfigured(&'static str),

    #[error("Failed to start {0}: {1}")]
    Spawn(String, String),

    #[error("{0} exited with {1}")]
    Failed(String, String),

    #[error("{0} timed out")]
    Timeout(String),
}

#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Capture one utterance; empty on silence or failure
    async fn listen_once(&self, window: ListenWindow) -> String;
}

#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`; failures are logged, never returned
    async fn speak(&self, text: &str);
}

/// Hard upper bound for one capture
pub fn capture_deadline(window: ListenWindow) -> Duration {
    Duration::from_secs_f64(window.timeout_secs + window.phrase_limit_secs) + CAPTURE_GRACE
}

/// Runs the configured capture command and reads the transcript from stdout
///
/// The listen window is passed through `SOPHIE_LISTEN_TIMEOUT` and
/// `SOPHIE_PHRASE_LIMIT` (seconds).
#[derive(Debug, Clone)]
pub struct CommandListener {
    argv: Vec<String>,
}

impl CommandListener {
    pub fn new(argv: Vec<String>) -> Result<Self, SpeechError> {
        if argv.is_empty() {
            return Err(SpeechError::NotConfigured("capture"));
        }
        Ok(Self { argv })
    }

    pub fn from_config(config: &SpeechConfig) -> Result<Self, SpeechError> {
        Self::new(config.stt_command.clone())
    }

    async fn capture(&self, window: ListenWindow) -> Result<String, SpeechError> {
        let program = &self.argv[0];
        let child = Command::new(program)
            .args(&self.argv[1..])
            .env("SOPHIE_LISTEN_TIMEOUT", window.timeout_secs.to_string())
            .env("SOPHIE_PHRASE_LIMIT", window.phrase_limit_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn(program.clone(), e.to_string()))?;

        let output = tokio::time::timeout(capture_deadline(window), child.wait_with_output())
            .await
            .map_err(|_| SpeechError::Timeout(program.clone()))?
            .map_err(|e| SpeechError::Failed(program.clone(), e.to_string()))?;

        if !output.status.success() {
            return Err(SpeechError::Failed(program.clone(), output.status.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SpeechInput for CommandListener {
    async fn listen_once(&self, window: ListenWindow) -> String {
        match self.capture(window).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Capture produced nothing: {}", e);
                String::new()
            }
        }
    }
}

/// Speaks through an external TTS command such as `espeak`
#[derive(Debug, Clone)]
pub struct CommandSpeaker {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandSpeaker {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self, SpeechError> {
        if argv.is_empty() {
            return Err(SpeechError::NotConfigured("speech output"));
        }
        Ok(Self { argv, timeout })
    }

    async fn run(&self, text: &str) -> Result<(), SpeechError> {
        let program = &self.argv[0];
        let mut child = Command::new(program)
            .args(&self.argv[1..])
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn(program.clone(), e.to_string()))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| SpeechError::Timeout(program.clone()))?
            .map_err(|e| SpeechError::Failed(program.clone(), e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::Failed(program.clone(), status.to_string()))
        }
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeaker {
    async fn speak(&self, text: &str) {
        if let Err(e) = self.run(text).await {
            warn!("Speech output failed: {}", e);
        }
    }
}

/// Output for setups without a TTS command
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSpeaker;

#[async_trait]
impl SpeechOutput for SilentSpeaker {
    async fn speak(&self, _text: &str) {}
}
