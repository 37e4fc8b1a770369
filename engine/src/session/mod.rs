//! Session Loop
//!
//! Arbitrates between typed and spoken input and feeds one utterance at a
//! time to the dispatcher.
//!
//! # Voice states
//!
//! ```text
//! Idle --wake word--> WakeDetected --ack--> Capturing --utterance--> Responding --> Idle
//!   ^                                           |
//!   +------------------ silence ----------------+
//! ```
//!
//! In `both` mode typed input races the short wake-word capture every cycle.
//! If a non-blank line is available when the capture finishes, the line wins
//! and the spoken text is dropped. Blank lines never interrupt a capture.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{normalize_wake_word, AmbientConfig, ListenWindow, Mode, SessionConfig};
use crate::dispatch::Dispatcher;
use crate::speech::{capture_deadline, SpeechInput, SpeechOutput};
use sdk::errors::EngineError;

pub const WAKE_ACK: &str = "Yes, I'm listening.";
pub const NOT_CAUGHT: &str = "I didn't catch that. Say again.";

const SILENCE_BACKOFF: Duration = Duration::from_millis(100);
const CYCLE_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    WakeDetected,
    Capturing,
    Responding,
}

/// Why the session loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// An exit phrase was answered
    Exit,
    /// Typed input reached end of file
    InputClosed,
    /// The shutdown token was cancelled
    Cancelled,
}

/// Where replies go
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Present one reply to the user
    async fn deliver(&self, text: &str);

    /// Ask for the next typed line
    async fn prompt(&self) {}
}

/// Prints `Sophie: <reply>` on stdout and speaks it
pub struct ConsoleSink {
    speaker: Arc<dyn SpeechOutput>,
}

impl ConsoleSink {
    pub fn new(speaker: Arc<dyn SpeechOutput>) -> Self {
        Self { speaker }
    }
}

#[async_trait]
impl ResponseSink for ConsoleSink {
    async fn deliver(&self, text: &str) {
        println!("Sophie: {}", text);
        self.speaker.speak(text).await;
    }

    async fn prompt(&self) {
        print!("You: ");
        let _ = std::io::stdout().flush();
    }
}

/// Settings fixed at session start
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub mode: Mode,
    pub wake_word: String,
    pub ambient: AmbientConfig,
    pub wake_window: ListenWindow,
    pub command_window: ListenWindow,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            mode: config.mode,
            wake_word: config.wake_word.clone(),
            ambient: config.ambient.clone(),
            wake_window: config.wake_window,
            command_window: config.command_window,
        }
    }
}

/// Case-insensitive substring match against a normalized wake word
pub fn contains_wake_word(text: &str, wake_word: &str) -> bool {
    text.to_lowercase().contains(wake_word)
}

/// Short utterances that are answered without the wake word in `both` mode
pub fn is_ambient_trigger(text: &str, policy: &AmbientConfig) -> bool {
    if !policy.enabled || text.split_whitespace().count() > policy.max_words {
        return false;
    }
    let lowered = text.to_lowercase();
    policy.triggers.iter().any(|t| lowered.contains(t.as_str()))
}

/// Forward lines from `reader` into a channel; the channel closes at EOF
///
/// Reads on a plain thread so a pending read never holds up runtime
/// shutdown.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// First non-blank line already queued, without waiting
fn pending_line(rx: &mut mpsc::Receiver<String>) -> Option<String> {
    while let Ok(line) = rx.try_recv() {
        if !line.trim().is_empty() {
            return Some(line);
        }
    }
    None
}

enum Event {
    Cancelled,
    Typed(Option<String>),
    Heard(String),
}

pub struct Session {
    settings: SessionSettings,
    dispatcher: Arc<Dispatcher>,
    listener: Option<Arc<dyn SpeechInput>>,
    sink: Arc<dyn ResponseSink>,
    shutdown: CancellationToken,
    state: VoiceState,
}

impl Session {
    /// # Errors
    /// `EngineError::Config` if the wake word is empty or a voice mode has
    /// no speech input.
    pub fn new(
        mut settings: SessionSettings,
        dispatcher: Arc<Dispatcher>,
        listener: Option<Arc<dyn SpeechInput>>,
        sink: Arc<dyn ResponseSink>,
        shutdown: CancellationToken,
    ) -> Result<Self, EngineError> {
        settings.wake_word = normalize_wake_word(&settings.wake_word)?;

        if settings.mode.uses_voice() && listener.is_none() {
            return Err(EngineError::Config(format!(
                "{} mode needs a speech capture command (speech.stt_command)",
                settings.mode
            )));
        }

        Ok(Self {
            settings,
            dispatcher,
            listener,
            sink,
            shutdown,
            state: VoiceState::Idle,
        })
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    /// Run until an exit phrase, end of input, or shutdown
    ///
    /// `typed` carries lines of typed input; it is ignored in voice mode.
    pub async fn run(&mut self, typed: Option<mpsc::Receiver<String>>) -> SessionEnd {
        info!(
            "Session starting in {} mode (wake word '{}')",
            self.settings.mode, self.settings.wake_word
        );

        let end = match (self.settings.mode, typed) {
            (Mode::Text, Some(rx)) => self.run_text(rx).await,
            (Mode::Text, None) => SessionEnd::InputClosed,
            (Mode::Voice, _) => self.run_voice(None).await,
            (Mode::Both, typed) => self.run_voice(typed).await,
        };

        info!("Session ended: {:?}", end);
        end
    }

    async fn run_text(&mut self, mut rx: mpsc::Receiver<String>) -> SessionEnd {
        loop {
            self.sink.prompt().await;

            let line = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return SessionEnd::Cancelled,
                line = rx.recv() => line,
            };

            let Some(line) = line else {
                return SessionEnd::InputClosed;
            };
            if line.trim().is_empty() {
                continue;
            }
            if self.respond(line).await {
                return SessionEnd::Exit;
            }
        }
    }

    async fn run_voice(&mut self, mut typed: Option<mpsc::Receiver<String>>) -> SessionEnd {
        info!(
            "Listening. Say the wake word ('{}') to activate.",
            self.settings.wake_word
        );

        loop {
            self.state = VoiceState::Idle;

            match self.next_event(&mut typed).await {
                Event::Cancelled => return SessionEnd::Cancelled,
                Event::Typed(None) => {
                    debug!("Typed input closed, continuing with voice only");
                    typed = None;
                }
                Event::Typed(Some(line)) => {
                    if !line.trim().is_empty() && self.respond(line).await {
                        return SessionEnd::Exit;
                    }
                }
                Event::Heard(heard) => {
                    let heard = heard.trim();
                    if heard.is_empty() {
                        tokio::time::sleep(SILENCE_BACKOFF).await;
                        continue;
                    }
                    debug!("Heard {:?}", heard);

                    if contains_wake_word(heard, &self.settings.wake_word) {
                        match self.take_command().await {
                            None => return SessionEnd::Cancelled,
                            Some(true) => return SessionEnd::Exit,
                            Some(false) => {}
                        }
                    } else if self.settings.mode == Mode::Both
                        && is_ambient_trigger(heard, &self.settings.ambient)
                        && self.respond(heard.to_string()).await
                    {
                        return SessionEnd::Exit;
                    }
                }
            }

            tokio::time::sleep(CYCLE_PAUSE).await;
        }
    }

    /// Wait for the next typed line or short capture, whichever comes first
    async fn next_event(&self, typed: &mut Option<mpsc::Receiver<String>>) -> Event {
        let window = self.settings.wake_window;

        match typed.as_mut() {
            Some(rx) => {
                let capture = self.capture(window);
                tokio::pin!(capture);

                // Blank lines leave the capture running
                let event = loop {
                    let event = tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => Event::Cancelled,
                        line = rx.recv() => Event::Typed(line),
                        heard = &mut capture => Event::Heard(heard),
                    };
                    match event {
                        Event::Typed(Some(line)) if line.trim().is_empty() => continue,
                        other => break other,
                    }
                };

                // Typed input that arrived during the capture wins
                match event {
                    Event::Heard(heard) => match pending_line(rx) {
                        Some(line) => Event::Typed(Some(line)),
                        None => Event::Heard(heard),
                    },
                    other => other,
                }
            }
            None => tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Event::Cancelled,
                heard = self.capture(window) => Event::Heard(heard),
            },
        }
    }

    /// Acknowledge the wake word, capture the command and answer it
    ///
    /// Returns `None` on shutdown, otherwise whether the session must end.
    async fn take_command(&mut self) -> Option<bool> {
        self.state = VoiceState::WakeDetected;
        self.sink.deliver(WAKE_ACK).await;

        self.state = VoiceState::Capturing;
        let command = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return None,
            heard = self.capture(self.settings.command_window) => heard,
        };

        if command.trim().is_empty() {
            self.sink.deliver(NOT_CAUGHT).await;
            self.state = VoiceState::Idle;
            return Some(false);
        }

        Some(self.respond(command.trim().to_string()).await)
    }

    /// One capture bounded by its window plus a grace period; silence on timeout
    async fn capture(&self, window: ListenWindow) -> String {
        let Some(listener) = &self.listener else {
            return std::future::pending().await;
        };

        tokio::time::timeout(capture_deadline(window), listener.listen_once(window))
            .await
            .unwrap_or_else(|_| {
                debug!("Capture timed out");
                String::new()
            })
    }

    /// Dispatch one input and deliver the reply; returns whether to end
    async fn respond(&mut self, input: String) -> bool {
        self.state = VoiceState::Responding;

        let dispatcher = Arc::clone(&self.dispatcher);
        let reply = tokio::spawn(async move { dispatcher.dispatch(&input).await }).await;
        self.state = VoiceState::Idle;

        match reply {
            Ok(reply) => {
                self.sink.deliver(&reply.text).await;
                reply.terminate
            }
            Err(e) => {
                error!("Dispatch failed: {}", e);
                false
            }
        }
    }
}
