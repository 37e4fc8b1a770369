//! Command handlers for CLI operations
//!
//! - (no command): run the interactive session
//! - run: answer a single input
//! - history: show remembered exchanges
//! - doctor: report which collaborators are configured

use anyhow::{anyhow, Context, Result};
use sdk::errors::SophieErrorExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, Mode};
use crate::dispatch::{Collaborators, DispatchSettings, Dispatcher, SystemClock, WebTools};
use crate::gateway::OperationGateway;
use crate::llm::CompletionClient;
use crate::memory::MemoryStore;
use crate::platform::{AppTarget, SystemLauncher};
use crate::search::{http_client, DuckDuckGoSearch, PageSummarizer};
use crate::secrets::SecretManager;
use crate::session::{spawn_line_reader, ConsoleSink, Session, SessionSettings};
use crate::speech::{CommandListener, CommandSpeaker, SilentSpeaker, SpeechInput, SpeechOutput};
use crate::translate::{GoogleTranslator, Translator};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the dispatcher and every collaborator it uses from configuration
///
/// Collaborators that cannot be built are left out and their commands
/// answer with a configuration message.
pub fn build_dispatcher(config: &Config) -> Dispatcher {
    let secrets = SecretManager::default();
    let llm = CompletionClient::from_config(&config.llm, &secrets);

    let web = if config.search.enabled {
        match http_client(&config.search) {
            Ok(client) => Some(WebTools {
                search: Arc::new(DuckDuckGoSearch::new(
                    config.search.base_url.clone(),
                    client.clone(),
                )),
                summaries: Arc::new(PageSummarizer::new(client)),
            }),
            Err(e) => {
                warn!("Search disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let translator: Option<Arc<dyn Translator>> = if config.translate.enabled {
        match GoogleTranslator::new(&config.translate) {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                warn!("Translation disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let collaborators = Collaborators {
        llm,
        web,
        translator,
        launcher: Arc::new(SystemLauncher),
        clock: Arc::new(SystemClock),
    };

    let memory = MemoryStore::load(&config.memory.file, config.memory.max_items);

    Dispatcher::new(
        DispatchSettings::from_config(config),
        collaborators,
        OperationGateway::new(),
        memory,
    )
}

fn build_speaker(config: &Config) -> Arc<dyn SpeechOutput> {
    if config.speech.tts_command.is_empty() {
        return Arc::new(SilentSpeaker);
    }
    match CommandSpeaker::new(
        config.speech.tts_command.clone(),
        Duration::from_secs(config.speech.tts_timeout_secs),
    ) {
        Ok(speaker) => Arc::new(speaker),
        Err(e) => {
            warn!("Speech output disabled: {}", e);
            Arc::new(SilentSpeaker)
        }
    }
}

fn build_listener(config: &Config) -> Option<Arc<dyn SpeechInput>> {
    CommandListener::from_config(&config.speech)
        .ok()
        .map(|l| Arc::new(l) as Arc<dyn SpeechInput>)
}

/// Run the interactive session until exit, end of input, or Ctrl-C
pub async fn handle_session(config: &Config) -> Result<()> {
    let listener = build_listener(config);
    let mut settings = SessionSettings::from_config(&config.session);

    if settings.mode == Mode::Both && listener.is_none() {
        warn!("No speech capture command configured, using text mode");
        settings.mode = Mode::Text;
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            signal_token.cancel();
        }
    });

    let dispatcher = Arc::new(build_dispatcher(config));
    let sink = Arc::new(ConsoleSink::new(build_speaker(config)));
    let typed = settings
        .mode
        .uses_text()
        .then(|| spawn_line_reader(std::io::BufReader::new(std::io::stdin())));

    let mut session = Session::new(settings, dispatcher, listener, sink, shutdown)
        .map_err(|e| anyhow!("Failed to start session: {}. {}", e, e.user_hint()))?;
    session.run(typed).await;

    Ok(())
}

/// Answer a single input
pub async fn handle_run(input: String, config: &Config, format: OutputFormat) -> Result<()> {
    let dispatcher = build_dispatcher(config);
    let reply = dispatcher.dispatch(&input).await;

    match format {
        OutputFormat::Text => println!("{}", reply.text),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&reply).context("Failed to render reply")?
        ),
    }

    Ok(())
}

/// Show the last `limit` remembered exchanges
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let store = MemoryStore::load(&config.memory.file, config.memory.max_items);
    let entries = store.recent(limit);

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No conversations in memory");
                return Ok(());
            }

            println!("Conversation History (last {} exchanges):", entries.len());
            println!();

            for entry in entries {
                println!("{}", entry.ts.format("%Y-%m-%d %H:%M:%S"));
                println!("  You:    {}", entry.user);
                println!("  Sophie: {}", entry.assistant);
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "conversations": entries,
                "count": entries.len(),
                "limit": limit,
                "last_topic": store.last_topic(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Validate configuration and report collaborator availability
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid".to_string()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory", "Exists".to_string()));
    } else {
        checks.push(("Data directory", "Missing".to_string()));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    let memory = MemoryStore::load(&config.memory.file, config.memory.max_items);
    checks.push((
        "Memory",
        format!("{} of {} exchanges", memory.len(), memory.max_items()),
    ));

    let llm = CompletionClient::from_config(&config.llm, &SecretManager::default());
    match llm.provider_name() {
        Some(name) => {
            let status = if llm.check_health().await {
                "Available"
            } else {
                "Unreachable"
            };
            checks.push(("Language model", format!("{} ({})", name, status)));
            if status != "Available" {
                issues.push(format!("Language model provider '{}' is not reachable", name));
            }
        }
        None => {
            checks.push(("Language model", "Not configured".to_string()));
            issues.push(
                "No language model. Set OPENAI_API_KEY or use llm.provider = \"ollama\"."
                    .to_string(),
            );
        }
    }

    let enabled = |on: bool| (if on { "Enabled" } else { "Disabled" }).to_string();
    checks.push(("Web search", enabled(config.search.enabled)));
    checks.push(("Translation", enabled(config.translate.enabled)));

    if config.speech.stt_command.is_empty() {
        checks.push(("Speech capture", "Not configured".to_string()));
        if config.session.mode == Mode::Voice {
            issues.push("Voice mode needs speech.stt_command".to_string());
        }
    } else {
        checks.push(("Speech capture", config.speech.stt_command.join(" ")));
    }

    if config.speech.tts_command.is_empty() {
        checks.push(("Speech output", "Silent".to_string()));
    } else {
        checks.push(("Speech output", config.speech.tts_command.join(" ")));
    }

    let apps: Vec<String> = [AppTarget::Notepad, AppTarget::Calculator, AppTarget::Browser]
        .into_iter()
        .filter(|t| t.is_supported())
        .map(|t| t.to_string())
        .collect();
    checks.push(("Applications", apps.join(", ")));

    match format {
        OutputFormat::Text => {
            println!("Sophie System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
