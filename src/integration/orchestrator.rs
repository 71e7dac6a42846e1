//! Orchestrator for the conversation turn loop
//!
//! Connects all components: speech input -> conversation service -> speech
//! output -> speech input again.
//!
//! The orchestrator runs as one tokio task that owns every piece of mutable
//! turn state. Commands from the host, platform speech callbacks, timers and
//! remote call completions all arrive as messages on a single inbox, so they
//! are applied one at a time in arrival order.

use crate::client::{Connectivity, ConnectivityFlag, ConversationClient, LlmRequest, Session};
use crate::integration::config::AssistantConfig;
use crate::integration::state::{derive_status, SharedAssistantState, TurnStatus};
use crate::llm::context::{context_window, ConversationMessage};
use crate::llm::prompts::{
    build_prompt, reply_or_fallback, OFFLINE_MESSAGE, SESSION_UNAVAILABLE_MESSAGE,
};
use crate::messages::{Message, Transcript};
use crate::resilience::classify::{
    handle_recognition_error, RecognitionErrorCode, RecognitionErrorPolicy,
};
use crate::resilience::retry::{should_retry_error, with_retry, RetryPolicy};
use crate::resilience::timeout::{with_timeout, LLM_TIMEOUT_MESSAGE};
use crate::speech::input::{InputOutcome, RecognitionEngine, RecognitionEvent, SpeechInput};
use crate::speech::output::{OutputOutcome, SpeechOutput, SynthesisEngine, SynthesisEvent};
use crate::speech::settings::{SettingsSource, SharedSettings};
use crate::speech::EventSink;
use crate::{Result, TessaError};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Commands that can be sent to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantCommand {
    /// Manually start listening
    StartListening,

    /// Stop the current recognition session
    StopListening,

    /// Text typed by the user; handled like a recognized transcript
    SendText(String),

    /// The typing animation for a message has finished
    TypingComplete { id: Uuid },

    /// Open a fresh session and clear the transcript
    NewConversation,

    /// Stop speech in both directions and end the task
    Shutdown,
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    /// The derived turn status changed
    StatusChanged(TurnStatus),

    /// A message was added to the transcript
    MessageAppended(Message),

    /// A typing message became final
    MessageFinalized(Message),

    /// The transcript was emptied for a new conversation
    TranscriptCleared,

    /// Something failed; carries the sentence to show the user
    Error(String),

    /// Orchestrator has shut down
    Shutdown,
}

/// What to do once an utterance has been spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSpeech {
    Nothing,
    StartListening,
}

/// Everything the orchestrator task reacts to
#[derive(Debug)]
enum Inbox {
    /// From the handle
    Command(AssistantCommand),

    /// Platform recognizer callback
    Recognition(RecognitionEvent),

    /// Platform synthesizer callback
    Synthesis(SynthesisEvent),

    /// Startup lookup of the latest session
    SessionResolved(Result<Session>),

    /// Fresh session for a new conversation
    SessionCreated(Result<Session>),

    /// Greeting delay elapsed
    GreetingDue,

    /// Restart delay after a recognition error elapsed
    RestartListening,

    /// Remote call for `turn` completed
    RemoteFinished { turn: u64, result: Result<String> },
}

/// Entry point for platform speech callbacks.
///
/// Engines receive their sinks through `attach` when the orchestrator is
/// built. Events posted after shutdown are dropped.
#[derive(Clone)]
pub struct PlatformSink {
    inbox_tx: mpsc::UnboundedSender<Inbox>,
    alive: Arc<AtomicBool>,
}

impl PlatformSink {
    fn post(&self, message: Inbox) {
        if self.alive.load(Ordering::SeqCst) {
            let _ = self.inbox_tx.send(message);
        }
    }

    pub fn recognition(&self) -> EventSink<RecognitionEvent> {
        let sink = self.clone();
        EventSink::new(move |event| sink.post(Inbox::Recognition(event)))
    }

    pub fn synthesis(&self) -> EventSink<SynthesisEvent> {
        let sink = self.clone();
        EventSink::new(move |event| sink.post(Inbox::Synthesis(event)))
    }
}

/// External services the orchestrator consumes
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn ConversationClient>,
    pub connectivity: Arc<dyn Connectivity>,
    pub settings: Arc<dyn SettingsSource>,
}

impl Collaborators {
    /// Always-online collaborators with default voice settings
    pub fn new(client: Arc<dyn ConversationClient>) -> Self {
        Self {
            client,
            connectivity: Arc::new(ConnectivityFlag::default()),
            settings: Arc::new(SharedSettings::default()),
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = settings;
        self
    }
}

/// Handle for controlling the orchestrator from the presentation layer
#[derive(Clone)]
pub struct OrchestratorHandle {
    /// Command sender
    inbox_tx: mpsc::UnboundedSender<Inbox>,

    /// Event receiver
    event_rx: Receiver<AssistantEvent>,

    /// Read-only view of the turn state
    state: SharedAssistantState,

    /// Cleared once the orchestrator shuts down
    alive: Arc<AtomicBool>,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: AssistantCommand) -> Result<()> {
        self.inbox_tx
            .send(Inbox::Command(cmd))
            .map_err(|e| TessaError::Channel(format!("Failed to send command: {}", e)))
    }

    pub fn start_listening(&self) -> Result<()> {
        self.send_command(AssistantCommand::StartListening)
    }

    pub fn stop_listening(&self) -> Result<()> {
        self.send_command(AssistantCommand::StopListening)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(AssistantCommand::SendText(text.into()))
    }

    /// Report that the typing animation of message `id` has finished
    pub fn finish_typing(&self, id: Uuid) -> Result<()> {
        self.send_command(AssistantCommand::TypingComplete { id })
    }

    pub fn new_conversation(&self) -> Result<()> {
        self.send_command(AssistantCommand::NewConversation)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(AssistantCommand::Shutdown)
    }

    pub fn state(&self) -> &SharedAssistantState {
        &self.state
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Try to receive an event from the orchestrator
    pub fn try_recv_event(&self) -> Option<AssistantEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block up to `timeout` for the next event
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<AssistantEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Every event currently queued
    pub fn drain_events(&self) -> Vec<AssistantEvent> {
        self.event_rx.try_iter().collect()
    }
}

/// The conversation orchestrator
pub struct Orchestrator<R: RecognitionEngine, S: SynthesisEngine> {
    config: AssistantConfig,
    retry_policy: RetryPolicy,

    input: SpeechInput<R>,
    output: SpeechOutput<S, AfterSpeech>,

    client: Arc<dyn ConversationClient>,
    connectivity: Arc<dyn Connectivity>,
    settings: Arc<dyn SettingsSource>,

    inbox_tx: mpsc::UnboundedSender<Inbox>,
    inbox_rx: mpsc::UnboundedReceiver<Inbox>,
    event_tx: Sender<AssistantEvent>,

    state: SharedAssistantState,
    alive: Arc<AtomicBool>,

    session_id: Option<String>,
    /// Set once the greeting has been scheduled; never cleared
    greeting_scheduled: bool,
    /// Set when the greeting is queued; ends `Initializing`
    initialized: bool,
    is_processing: bool,
    /// Id of the latest remote call; older completions are discarded
    turn: u64,
    status: TurnStatus,
}

impl<R, S> Orchestrator<R, S>
where
    R: RecognitionEngine + 'static,
    S: SynthesisEngine + 'static,
{
    /// Create a new orchestrator and its handle
    pub fn new(
        config: AssistantConfig,
        recognizer: R,
        synthesizer: S,
        collaborators: Collaborators,
    ) -> (Self, OrchestratorHandle) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = bounded(config.event_buffer_size.max(1));
        let alive = Arc::new(AtomicBool::new(true));
        let state = SharedAssistantState::new();

        let sink = PlatformSink {
            inbox_tx: inbox_tx.clone(),
            alive: Arc::clone(&alive),
        };

        let mut input = SpeechInput::new(recognizer, &config.recognition.session);
        input.attach(sink.recognition());
        let mut output = SpeechOutput::new(synthesizer);
        output.attach(sink.synthesis());

        state.update(|s| {
            s.voice_input_supported = input.is_supported();
            s.voice_output_supported = output.is_supported();
        });

        let handle = OrchestratorHandle {
            inbox_tx: inbox_tx.clone(),
            event_rx,
            state: state.clone(),
            alive: Arc::clone(&alive),
        };

        let orchestrator = Self {
            retry_policy: config.resilience.retry_policy(),
            config,
            input,
            output,
            client: collaborators.client,
            connectivity: collaborators.connectivity,
            settings: collaborators.settings,
            inbox_tx,
            inbox_rx,
            event_tx,
            state,
            alive,
            session_id: None,
            greeting_scheduled: false,
            initialized: false,
            is_processing: false,
            turn: 0,
            status: TurnStatus::Initializing,
        };

        (orchestrator, handle)
    }

    /// Spawn the orchestrator task
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Orchestrator started");
        self.resolve_session();

        while let Some(message) = self.inbox_rx.recv().await {
            if !self.handle(message) {
                break;
            }
            self.publish();
        }

        self.alive.store(false, Ordering::SeqCst);
        info!("Orchestrator stopped");
    }

    /// Apply one inbox message. Returns `false` once the loop should end.
    fn handle(&mut self, message: Inbox) -> bool {
        match message {
            Inbox::Command(cmd) => {
                debug!("Command: {:?}", cmd);
                match cmd {
                    AssistantCommand::StartListening => self.start_listening(),
                    AssistantCommand::StopListening => self.input.stop(),
                    AssistantCommand::SendText(text) => self.handle_user_text(text),
                    AssistantCommand::TypingComplete { id } => self.finish_typing(id),
                    AssistantCommand::NewConversation => self.new_conversation(),
                    AssistantCommand::Shutdown => {
                        self.shutdown();
                        return false;
                    }
                }
            }

            Inbox::Recognition(event) => {
                if let Some(outcome) = self.input.handle_event(event) {
                    self.handle_input(outcome);
                }
            }

            Inbox::Synthesis(event) => {
                if let Some(outcome) = self.output.handle_event(event) {
                    self.handle_output(outcome);
                }
            }

            Inbox::SessionResolved(result) => self.handle_session(result, false),
            Inbox::SessionCreated(result) => self.handle_session(result, true),
            Inbox::GreetingDue => self.greet(),
            Inbox::RestartListening => self.start_listening(),
            Inbox::RemoteFinished { turn, result } => self.handle_remote(turn, result),
        }

        true
    }

    // -- session --

    fn resolve_session(&self) {
        let client = Arc::clone(&self.client);
        let agent = self.config.agent.name.clone();
        self.spawn_task(async move {
            Inbox::SessionResolved(client.get_or_create_session(&agent).await)
        });
    }

    fn new_conversation(&mut self) {
        info!("Starting new conversation");
        let client = Arc::clone(&self.client);
        let agent = self.config.agent.name.clone();
        self.spawn_task(async move { Inbox::SessionCreated(client.create_session(&agent).await) });
    }

    fn handle_session(&mut self, result: Result<Session>, fresh: bool) {
        let session = match result {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to resolve conversation session: {}", e);
                self.report_error(SESSION_UNAVAILABLE_MESSAGE);
                return;
            }
        };

        info!("Using session {} ({} stored messages)", session.id, session.messages.len());
        self.session_id = Some(session.id.clone());
        self.clear_error();

        if fresh {
            // Discard any reply still in flight for the old session
            self.turn += 1;
            self.is_processing = false;
            self.state.update(|s| s.transcript.clear());
            self.emit(AssistantEvent::TranscriptCleared);
        } else {
            let history = Transcript::from_history(session.transcript_messages());
            let replayed = history.messages().to_vec();
            self.state.update(|s| s.transcript = history);
            for message in replayed {
                self.emit(AssistantEvent::MessageAppended(message));
            }
        }

        if !self.greeting_scheduled {
            self.greeting_scheduled = true;
            self.schedule(Inbox::GreetingDue, self.config.greeting_delay());
        }
    }

    fn greet(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        let greeting = self.config.agent.greeting.clone();
        info!("Greeting the user");
        self.append(Message::assistant_typing(greeting.clone()));
        self.speak(&greeting, AfterSpeech::StartListening);
    }

    // -- speech input --

    fn start_listening(&mut self) {
        if let Err(e) = self.input.start() {
            let code = RecognitionErrorCode::Other(e.to_string());
            self.apply_recognition_policy(handle_recognition_error(&code));
        }
    }

    fn handle_input(&mut self, outcome: InputOutcome) {
        match outcome {
            InputOutcome::Started => debug!("Listening"),
            InputOutcome::Transcript(text) => self.handle_user_text(text),
            InputOutcome::Failed { policy, .. } => self.apply_recognition_policy(policy),
            InputOutcome::Ended => debug!("Recognition ended without a result"),
        }
    }

    fn apply_recognition_policy(&mut self, policy: RecognitionErrorPolicy) {
        if let Some(message) = policy.message {
            self.append(Message::assistant_typing(message));
            self.speak(message, AfterSpeech::Nothing);
        }

        if policy.should_restart && self.input.is_supported() {
            self.schedule(Inbox::RestartListening, self.config.restart_delay());
        }
    }

    // -- turn --

    fn handle_user_text(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        let Some(session_id) = self.session_id.clone() else {
            warn!("Dropping input before the session is ready");
            return;
        };

        if self.is_processing {
            warn!("Dropping input while a turn is in progress");
            return;
        }

        // Context is taken before the new user message is added
        let context = context_window(&self.state.messages(), self.config.agent.context_window);
        self.append(Message::user(text.clone()));

        if !self.connectivity.is_online() {
            warn!("Offline, skipping remote call");
            self.append(Message::assistant_typing(OFFLINE_MESSAGE));
            self.speak(OFFLINE_MESSAGE, AfterSpeech::Nothing);
            return;
        }

        self.is_processing = true;
        self.turn += 1;
        let turn = self.turn;

        let request = LlmRequest {
            prompt: build_prompt(&context, &text),
            use_internet_context: self.config.resilience.use_internet_context,
        };
        let client = Arc::clone(&self.client);
        let policy = self.retry_policy.clone();
        let limit = self.config.resilience.llm_timeout();

        debug!("Turn {} started", turn);
        self.spawn_task(async move {
            let result = run_remote_turn(client, session_id, text, request, policy, limit).await;
            Inbox::RemoteFinished { turn, result }
        });
    }

    fn handle_remote(&mut self, turn: u64, result: Result<String>) {
        if turn != self.turn {
            debug!("Discarding reply for stale turn {}", turn);
            return;
        }
        self.is_processing = false;

        match result {
            Ok(reply) => {
                debug!("Turn {} answered", turn);
                self.clear_error();
                self.append(Message::assistant_typing(reply.clone()));
                self.speak(&reply, AfterSpeech::StartListening);
            }
            Err(e) => {
                error!("Turn {} failed: {}", turn, e);
                let message = e.user_message();
                self.report_error(message);
                self.append(Message::assistant_typing(message));
                self.speak(message, AfterSpeech::Nothing);
            }
        }
    }

    // -- speech output --

    /// Speak `text`. When nothing can be spoken a `StartListening` follow-up
    /// runs immediately.
    fn speak(&mut self, text: &str, follow_up: AfterSpeech) {
        let settings = self.settings.voice_settings();
        let spoken = match self.output.speak(text, &settings, follow_up) {
            Ok(id) => id.is_some(),
            Err(e) => {
                warn!("Failed to speak: {}", e);
                false
            }
        };

        if !spoken && follow_up == AfterSpeech::StartListening {
            self.start_listening();
        }
    }

    fn handle_output(&mut self, outcome: OutputOutcome<AfterSpeech>) {
        match outcome {
            OutputOutcome::Started => debug!("Speaking"),
            OutputOutcome::Finished(AfterSpeech::StartListening) => self.start_listening(),
            OutputOutcome::Finished(AfterSpeech::Nothing) => {}
            OutputOutcome::Failed(error) => debug!("Utterance failed: {}", error),
        }
    }

    // -- transcript --

    fn append(&mut self, message: Message) {
        let (appended, finalized) = self.state.update(|s| {
            let pending = s.transcript.trailing_typing().map(|m| m.id);
            s.transcript.apply(message);

            let finalized = pending.and_then(|id| {
                s.transcript
                    .messages()
                    .iter()
                    .find(|m| m.id == id && !m.is_typing)
                    .cloned()
            });
            (s.transcript.last().cloned(), finalized)
        });

        if let Some(message) = finalized {
            self.emit(AssistantEvent::MessageFinalized(message));
        }
        if let Some(message) = appended {
            self.emit(AssistantEvent::MessageAppended(message));
        }
    }

    fn finish_typing(&mut self, id: Uuid) {
        match self.state.update(|s| s.transcript.finish_typing(id)) {
            Some(message) => self.emit(AssistantEvent::MessageFinalized(message)),
            None => debug!("Ignoring typing completion for {}", id),
        }
    }

    // -- lifecycle --

    fn shutdown(&mut self) {
        info!("Shutting down orchestrator");
        self.alive.store(false, Ordering::SeqCst);
        self.input.stop();
        self.output.cancel();
        self.is_processing = false;
        self.state.update(|s| {
            s.is_listening = false;
            s.is_speaking = false;
            s.is_processing = false;
        });
        self.emit(AssistantEvent::Shutdown);
    }

    /// Post `message` back to the inbox after `delay`, unless shut down
    fn schedule(&self, message: Inbox, delay: Duration) {
        let inbox_tx = self.inbox_tx.clone();
        let alive = Arc::clone(&self.alive);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if alive.load(Ordering::SeqCst) {
                let _ = inbox_tx.send(message);
            }
        });
    }

    /// Run `task` and post its result back to the inbox, unless shut down
    fn spawn_task<F>(&self, task: F)
    where
        F: std::future::Future<Output = Inbox> + Send + 'static,
    {
        let inbox_tx = self.inbox_tx.clone();
        let alive = Arc::clone(&self.alive);
        tokio::spawn(async move {
            let message = task.await;
            if alive.load(Ordering::SeqCst) {
                let _ = inbox_tx.send(message);
            }
        });
    }

    fn report_error(&mut self, message: &str) {
        self.state.update(|s| s.last_error = Some(message.to_string()));
        self.emit(AssistantEvent::Error(message.to_string()));
    }

    fn clear_error(&self) {
        self.state.update(|s| s.last_error = None);
    }

    /// Recompute the status and mirror the turn flags into the shared state
    fn publish(&mut self) {
        let is_listening = self.input.is_listening();
        let is_speaking = self.output.is_speaking();

        let status = if self.initialized {
            derive_status(is_listening, is_speaking, self.is_processing)
        } else {
            TurnStatus::Initializing
        };

        let session_id = self.session_id.clone();
        let is_processing = self.is_processing;
        self.state.update(|s| {
            s.is_listening = is_listening;
            s.is_speaking = is_speaking;
            s.is_processing = is_processing;
            s.session_id = session_id;
            s.status = status;
        });

        if status != self.status {
            debug!("Status: {:?} -> {:?}", self.status, status);
            self.status = status;
            self.emit(AssistantEvent::StatusChanged(status));
        }
    }

    fn emit(&self, event: AssistantEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event buffer full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Store the user message, call the LLM under retry and timeout, store the
/// reply. Storage failures are logged; only the LLM call can fail the turn.
async fn run_remote_turn(
    client: Arc<dyn ConversationClient>,
    session_id: String,
    user_text: String,
    request: LlmRequest,
    policy: RetryPolicy,
    limit: Duration,
) -> Result<String> {
    if let Err(e) = client
        .append_message(&session_id, ConversationMessage::user(user_text))
        .await
    {
        warn!("Failed to store user message: {}", e);
    }

    let reply = with_timeout(
        with_retry(|| client.invoke_llm(&request), &policy, should_retry_error),
        limit,
        LLM_TIMEOUT_MESSAGE,
    )
    .await?;
    let reply = reply_or_fallback(reply);

    if let Err(e) = client
        .append_message(&session_id, ConversationMessage::assistant(reply.clone()))
        .await
    {
        warn!("Failed to store assistant reply: {}", e);
    }

    Ok(reply)
}
