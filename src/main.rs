use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tessa::client::InMemoryClient;
use tessa::integration::{
    AssistantConfig, AssistantEvent, Collaborators, Orchestrator, OrchestratorHandle,
};
use tessa::speech::{ConsoleSynthesizer, LineRecognizer, SharedSettings};
use tessa::ui::TranscriptView;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SPEAKING_TIME_PER_CHAR: Duration = Duration::from_millis(15);

fn load_config() -> Result<AssistantConfig> {
    if let Some(path) = std::env::args().nth(1) {
        return AssistantConfig::load(&path).with_context(|| format!("Failed to load {}", path));
    }

    match AssistantConfig::default_path().filter(|p| p.exists()) {
        Some(path) => AssistantConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => Ok(AssistantConfig::default()),
    }
}

/// Read stdin on a plain thread. Lines go to the recognizer while it is
/// listening and are sent as typed text otherwise.
fn spawn_stdin_reader(recognizer: LineRecognizer, handle: OrchestratorHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let sent = match line.trim() {
                "/quit" => break,
                "/new" => handle.new_conversation(),
                "/listen" => handle.start_listening(),
                text if recognizer.hear(text) => Ok(()),
                text => handle.send_text(text),
            };
            if sent.is_err() {
                return;
            }
        }
        let _ = handle.shutdown();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessa=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Tessa voice assistant");

    let config = load_config()?;
    config.validate()?;

    let recognizer = LineRecognizer::new();
    let settings = Arc::new(SharedSettings::new(config.voice.clone()));
    let collaborators =
        Collaborators::new(Arc::new(InMemoryClient::loopback())).with_settings(settings);

    let typing_speed = config.typing_speed();
    let (orchestrator, handle) = Orchestrator::new(
        config,
        recognizer.clone(),
        ConsoleSynthesizer::new(SPEAKING_TIME_PER_CHAR),
        collaborators,
    );
    let task = orchestrator.start();
    spawn_stdin_reader(recognizer, handle.clone());

    println!("Type to talk. /new starts over, /listen re-arms the mic, /quit exits.");

    let mut view = TranscriptView::new();
    let mut typing = HashSet::new();
    let mut ticker = tokio::time::interval(typing_speed.max(Duration::from_millis(1)));

    'render: loop {
        ticker.tick().await;

        for event in handle.drain_events() {
            view.apply(&event);
            match event {
                AssistantEvent::StatusChanged(status) => println!("[{}]", status),
                AssistantEvent::MessageAppended(message) if message.is_typing => {
                    typing.insert(message.id);
                }
                AssistantEvent::MessageAppended(message) => {
                    println!("{}", view.render_message(&message));
                }
                AssistantEvent::MessageFinalized(message) => {
                    if typing.remove(&message.id) {
                        println!("{}", view.render_message(&message));
                    }
                }
                AssistantEvent::TranscriptCleared => println!("--- new conversation ---"),
                AssistantEvent::Error(message) => warn!("{}", message),
                AssistantEvent::Shutdown => break 'render,
            }
        }

        for id in view.tick() {
            handle.finish_typing(id)?;
        }
    }

    task.await.context("Orchestrator task failed")?;
    info!("Goodbye");
    Ok(())
}
