//! Integration tests for the session loop
//!
//! A scripted listener plays back utterances and a recording sink captures
//! every delivered reply.

use async_trait::async_trait;
use sophie_engine::config::{AmbientConfig, ListenWindow, Mode, SessionConfig};
use sophie_engine::dispatch::{
    Collaborators, DispatchSettings, Dispatcher, SystemClock,
};
use sophie_engine::gateway::OperationGateway;
use sophie_engine::llm::{CompletionClient, LLMError, LLMProvider};
use sophie_engine::memory::MemoryStore;
use sophie_engine::platform::SystemLauncher;
use sophie_engine::session::{
    ResponseSink, Session, SessionEnd, SessionSettings, NOT_CAUGHT, WAKE_ACK,
};
use sophie_engine::speech::SpeechInput;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Plays back a fixed script, then stays silent
struct ScriptedListener {
    script: Mutex<VecDeque<&'static str>>,
    delay: Duration,
}

impl ScriptedListener {
    fn new(script: &[&'static str]) -> Arc<Self> {
        Self::with_delay(script, Duration::from_millis(1))
    }

    fn with_delay(script: &[&'static str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            delay,
        })
    }
}

#[async_trait]
impl SpeechInput for ScriptedListener {
    async fn listen_once(&self, _window: ListenWindow) -> String {
        tokio::time::sleep(self.delay).await;
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_default().to_string()
    }
}

/// Takes its utterance when the capture starts, so a dropped capture loses it
struct LiveListener {
    script: Mutex<VecDeque<&'static str>>,
    delay: Duration,
}

#[async_trait]
impl SpeechInput for LiveListener {
    async fn listen_once(&self, _window: ListenWindow) -> String {
        let next = self.script.lock().unwrap().pop_front();
        tokio::time::sleep(self.delay).await;
        next.unwrap_or_default().to_string()
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn deliver(&self, text: &str) {
        self.delivered.lock().unwrap().push(text.to_string());
    }
}

struct Echo;

#[async_trait]
impl LLMProvider for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LLMError> {
        if prompt.contains("explode") {
            panic!("model exploded");
        }
        Ok(format!("echo: {}", prompt))
    }
}

fn dispatcher(dir: &TempDir) -> Arc<Dispatcher> {
    let collaborators = Collaborators {
        llm: CompletionClient::new(Arc::new(Echo), Duration::from_secs(5)),
        web: None,
        translator: None,
        launcher: Arc::new(SystemLauncher),
        clock: Arc::new(SystemClock),
    };
    Arc::new(Dispatcher::new(
        DispatchSettings::default(),
        collaborators,
        OperationGateway::new(),
        MemoryStore::new(dir.path().join("memory.json"), 200),
    ))
}

fn settings(mode: Mode) -> SessionSettings {
    let window = ListenWindow {
        timeout_secs: 0.2,
        phrase_limit_secs: 0.2,
    };
    SessionSettings {
        mode,
        wake_word: "Sophie".to_string(),
        ambient: AmbientConfig::default(),
        wake_window: window,
        command_window: window,
    }
}

async fn run_session(
    mode: Mode,
    listener: Option<Arc<dyn SpeechInput>>,
    typed: Option<mpsc::Receiver<String>>,
) -> (SessionEnd, Vec<String>) {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let mut session = Session::new(
        settings(mode),
        dispatcher(&dir),
        listener,
        sink.clone(),
        CancellationToken::new(),
    )
    .unwrap();

    let end = tokio::time::timeout(Duration::from_secs(10), session.run(typed))
        .await
        .expect("session did not finish");
    (end, sink.delivered())
}

fn typed_lines(lines: &[&str]) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    for line in lines {
        tx.try_send(line.to_string()).unwrap();
    }
    rx
}

#[tokio::test]
async fn test_text_mode_until_exit() {
    let typed = typed_lines(&["", "  ", "gpt: hi", "quit", "gpt: never"]);
    let (end, delivered) = run_session(Mode::Text, None, Some(typed)).await;

    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(delivered, vec!["echo: hi", "Goodbye. Take care."]);
}

#[tokio::test]
async fn test_text_mode_ends_at_eof() {
    let (tx, rx) = mpsc::channel(4);
    tx.send("gpt: one".to_string()).await.unwrap();
    drop(tx);

    let (end, delivered) = run_session(Mode::Text, None, Some(rx)).await;
    assert_eq!(end, SessionEnd::InputClosed);
    assert_eq!(delivered, vec!["echo: one"]);
}

#[tokio::test]
async fn test_voice_wake_word_flow() {
    let listener = ScriptedListener::new(&[
        "",
        "random chatter",
        "hey SOPHIE",
        "gpt: weather",
        "sophie",
        "",
        "sophie",
        "exit",
    ]);
    let (end, delivered) = run_session(Mode::Voice, Some(listener), None).await;

    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(
        delivered,
        vec![
            WAKE_ACK,
            "echo: weather",
            WAKE_ACK,
            NOT_CAUGHT,
            WAKE_ACK,
            "Goodbye. Take care.",
        ]
    );
}

#[tokio::test]
async fn test_ambient_trigger_only_in_both_mode() {
    let script = &["hello there", "sophie", "exit"];

    let (_, voice) = run_session(Mode::Voice, Some(ScriptedListener::new(script)), None).await;
    assert_eq!(voice[0], WAKE_ACK);

    let (_, both) = run_session(Mode::Both, Some(ScriptedListener::new(script)), None).await;
    assert_ne!(both[0], WAKE_ACK);
    assert_eq!(both[1], WAKE_ACK);
}

#[tokio::test]
async fn test_typed_input_wins_in_both_mode() {
    // The capture is slow enough that the typed line is always first
    let listener = ScriptedListener::with_delay(&["sophie", "gpt: spoken"], Duration::from_millis(200));
    let typed = typed_lines(&["gpt: typed", "bye"]);

    let (end, delivered) = run_session(Mode::Both, Some(listener), Some(typed)).await;
    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(delivered, vec!["echo: typed", "Goodbye. Take care."]);
}

#[tokio::test]
async fn test_blank_typed_line_keeps_voice_capture() {
    let listener = Arc::new(LiveListener {
        script: Mutex::new(["sophie", "gpt: spoken", "sophie", "exit"].into_iter().collect()),
        delay: Duration::from_millis(150),
    });

    // Keep the sender open so typed input stays live for the whole session
    let (tx, rx) = mpsc::channel(4);
    let typist = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send("   ".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(String::new()).await.unwrap();
        std::future::pending::<()>().await;
    });

    let (end, delivered) = run_session(Mode::Both, Some(listener), Some(rx)).await;
    typist.abort();

    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(
        delivered,
        vec![WAKE_ACK, "echo: spoken", WAKE_ACK, "Goodbye. Take care."]
    );
}

#[tokio::test]
async fn test_panicking_dispatch_does_not_end_session() {
    let typed = typed_lines(&["gpt: explode", "gpt: still here", "stop"]);
    let (end, delivered) = run_session(Mode::Text, None, Some(typed)).await;

    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(delivered, vec!["echo: still here", "Goodbye. Take care."]);
}

#[tokio::test]
async fn test_cancellation_stops_voice_loop() {
    let dir = TempDir::new().unwrap();
    let shutdown = CancellationToken::new();
    let mut session = Session::new(
        settings(Mode::Voice),
        dispatcher(&dir),
        Some(ScriptedListener::new(&[])),
        Arc::new(RecordingSink::default()),
        shutdown.clone(),
    )
    .unwrap();

    let handle = tokio::spawn(async move { session.run(None).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let end = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(end, SessionEnd::Cancelled);
}

#[test]
fn test_voice_mode_requires_listener() {
    let dir = TempDir::new().unwrap();
    let result = Session::new(
        settings(Mode::Voice),
        dispatcher(&dir),
        None,
        Arc::new(RecordingSink::default()),
        CancellationToken::new(),
    );
    assert!(result.is_err());
}

#[test]
fn test_empty_wake_word_rejected() {
    let dir = TempDir::new().unwrap();
    let mut bad = settings(Mode::Text);
    bad.wake_word = "   ".to_string();
    let result = Session::new(
        bad,
        dispatcher(&dir),
        None,
        Arc::new(RecordingSink::default()),
        CancellationToken::new(),
    );
    assert!(result.is_err());
}

#[test]
fn test_settings_from_config() {
    let config = SessionConfig::default();
    let settings = SessionSettings::from_config(&config);
    assert_eq!(settings.mode, Mode::Both);
    assert_eq!(settings.wake_word, "sophie");
    assert_eq!(settings.wake_window.timeout_secs, 5.0);
    assert_eq!(settings.command_window.phrase_limit_secs, 12.0);
}
