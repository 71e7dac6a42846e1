//! End-to-end turn tests
//!
//! These tests drive the orchestrator through scripted recognition and
//! synthesis engines and a scripted conversation client. Time is paused, so
//! greeting, restart, backoff and timeout delays run on virtual time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tessa::client::{ConnectivityFlag, InMemoryClient, Session};
use tessa::integration::{
    AssistantConfig, AssistantEvent, Collaborators, Orchestrator, OrchestratorHandle, TurnStatus,
};
use tessa::llm::prompts::{GREETING, NO_UNDERSTANDING_MESSAGE, OFFLINE_MESSAGE};
use tessa::llm::ConversationMessage;
use tessa::messages::{Message, Sender};
use tessa::resilience::{ErrorCategory, RecognitionErrorCode};
use tessa::speech::{
    EventSink, RecognitionConfig, RecognitionEngine, RecognitionEvent, SynthesisEngine,
    SynthesisEvent, Utterance, Voice,
};
use tessa::TessaError;
use tokio::task::JoinHandle;

// -- scripted engines --

#[derive(Default)]
struct MicState {
    sink: Option<EventSink<RecognitionEvent>>,
    starts: usize,
    stops: usize,
}

/// Recognizer the test speaks into
#[derive(Clone)]
struct FakeMic {
    supported: bool,
    state: Arc<Mutex<MicState>>,
}

impl FakeMic {
    fn new(supported: bool) -> Self {
        Self {
            supported,
            state: Arc::new(Mutex::new(MicState::default())),
        }
    }

    fn emit(&self, event: RecognitionEvent) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    fn say(&self, text: &str) {
        self.emit(RecognitionEvent::Result {
            transcript: text.to_string(),
            is_final: true,
        });
    }

    fn fail(&self, code: &str) {
        self.emit(RecognitionEvent::Error(RecognitionErrorCode::parse(code)));
        self.emit(RecognitionEvent::Ended);
    }

    fn starts(&self) -> usize {
        self.state.lock().starts
    }

    fn stops(&self) -> usize {
        self.state.lock().stops
    }
}

impl RecognitionEngine for FakeMic {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn attach(&mut self, sink: EventSink<RecognitionEvent>) {
        self.state.lock().sink = Some(sink);
    }

    fn configure(&mut self, _config: &RecognitionConfig) {}

    fn start(&mut self) -> tessa::Result<()> {
        self.state.lock().starts += 1;
        self.emit(RecognitionEvent::Started);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().stops += 1;
        self.emit(RecognitionEvent::Ended);
    }

    fn abort(&mut self) {
        self.emit(RecognitionEvent::Ended);
    }
}

#[derive(Default)]
struct SpeakerState {
    sink: Option<EventSink<SynthesisEvent>>,
    spoken: Vec<Utterance>,
    cancels: usize,
}

/// Synthesizer whose utterances end when the test says so
#[derive(Clone)]
struct FakeSpeaker {
    supported: bool,
    state: Arc<Mutex<SpeakerState>>,
}

impl FakeSpeaker {
    fn new(supported: bool) -> Self {
        Self {
            supported,
            state: Arc::new(Mutex::new(SpeakerState::default())),
        }
    }

    fn finish_current(&self) {
        let (sink, id) = {
            let state = self.state.lock();
            (state.sink.clone(), state.spoken.last().map(|u| u.id))
        };
        if let (Some(sink), Some(id)) = (sink, id) {
            sink.emit(SynthesisEvent::Ended { id });
        }
    }

    fn spoken(&self) -> Vec<String> {
        self.state.lock().spoken.iter().map(|u| u.text.clone()).collect()
    }

    fn cancels(&self) -> usize {
        self.state.lock().cancels
    }
}

impl SynthesisEngine for FakeSpeaker {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn attach(&mut self, sink: EventSink<SynthesisEvent>) {
        self.state.lock().sink = Some(sink);
    }

    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Samantha", "en-US")]
    }

    fn speak(&mut self, utterance: Utterance) -> tessa::Result<()> {
        let id = utterance.id;
        let sink = {
            let mut state = self.state.lock();
            state.spoken.push(utterance);
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.emit(SynthesisEvent::Started { id });
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.state.lock().cancels += 1;
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

// -- harness --

struct TestAssistant {
    handle: OrchestratorHandle,
    client: Arc<InMemoryClient>,
    mic: FakeMic,
    speaker: FakeSpeaker,
    online: ConnectivityFlag,
    task: JoinHandle<()>,
}

impl TestAssistant {
    fn start(client: InMemoryClient) -> Self {
        Self::start_with(client, true, true)
    }

    fn start_with(client: InMemoryClient, mic_supported: bool, speaker_supported: bool) -> Self {
        let client = Arc::new(client);
        let mic = FakeMic::new(mic_supported);
        let speaker = FakeSpeaker::new(speaker_supported);
        let online = ConnectivityFlag::new(true);

        let collaborators =
            Collaborators::new(client.clone()).with_connectivity(Arc::new(online.clone()));
        let (orchestrator, handle) = Orchestrator::new(
            AssistantConfig::default(),
            mic.clone(),
            speaker.clone(),
            collaborators,
        );
        let task = orchestrator.start();

        Self {
            handle,
            client,
            mic,
            speaker,
            online,
            task,
        }
    }

    /// Start and run through the greeting until the mic is listening
    async fn start_listening(client: InMemoryClient) -> Self {
        let assistant = Self::start(client);
        sleep_ms(1600).await;
        assistant.speaker.finish_current();
        settle().await;
        assert_eq!(assistant.status(), TurnStatus::Listening);
        assistant.handle.drain_events();
        assistant
    }

    fn status(&self) -> TurnStatus {
        self.handle.state().status()
    }

    fn messages(&self) -> Vec<Message> {
        self.handle.state().messages()
    }

    fn last_message(&self) -> Message {
        self.messages().pop().expect("transcript is empty")
    }

    fn statuses(&self) -> Vec<TurnStatus> {
        self.handle
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                AssistantEvent::StatusChanged(status) => Some(status),
                _ => None,
            })
            .collect()
    }
}

/// Let every ready task run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// -- startup --

#[tokio::test(start_paused = true)]
async fn test_greeting_after_delay_then_listening() {
    let assistant = TestAssistant::start(InMemoryClient::new("ok"));
    settle().await;

    assert_eq!(assistant.status(), TurnStatus::Initializing);
    assert!(assistant.handle.state().session_id().is_some());
    assert!(assistant.messages().is_empty());

    sleep_ms(1500).await;
    settle().await;

    let greeting = assistant.last_message();
    assert_eq!(greeting.text, GREETING);
    assert!(greeting.is_typing);
    assert_eq!(assistant.speaker.spoken(), vec![GREETING.to_string()]);
    assert_eq!(assistant.status(), TurnStatus::Speaking);
    assert_eq!(assistant.mic.starts(), 0);

    assistant.speaker.finish_current();
    settle().await;

    assert_eq!(assistant.mic.starts(), 1);
    assert_eq!(assistant.status(), TurnStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_greeting_without_synthesis_starts_listening() {
    let assistant = TestAssistant::start_with(InMemoryClient::new("ok"), true, false);
    sleep_ms(1600).await;

    assert_eq!(assistant.last_message().text, GREETING);
    assert!(assistant.speaker.spoken().is_empty());
    assert_eq!(assistant.mic.starts(), 1);
    assert_eq!(assistant.status(), TurnStatus::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_resumed_session_replays_history() {
    let stored = Session::new("s-1", "tessa_assistant").with_messages(vec![
        ConversationMessage::user("remember me?"),
        ConversationMessage::assistant("of course"),
    ]);
    let assistant = TestAssistant::start(InMemoryClient::new("ok").with_session(stored));
    settle().await;

    let messages = assistant.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_user());
    assert_eq!(messages[1].text, "of course");
    assert!(messages.iter().all(|m| !m.is_typing));
    assert_eq!(assistant.handle.state().session_id().as_deref(), Some("s-1"));

    sleep_ms(1600).await;
    assert_eq!(assistant.messages().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_session_failure_keeps_initializing() {
    let client = InMemoryClient::new("ok");
    client.fail_next_session(TessaError::Network("unreachable".to_string()));
    let assistant = TestAssistant::start(client);
    settle().await;

    let errors: Vec<String> = assistant
        .handle
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            AssistantEvent::Error(message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);

    sleep_ms(2000).await;
    assert_eq!(assistant.status(), TurnStatus::Initializing);
    assert!(assistant.messages().is_empty());

    // Input before a session exists is dropped
    assistant.handle.send_text("hello").unwrap();
    settle().await;
    assert_eq!(assistant.client.invoke_count(), 0);

    // A new conversation recovers and greets once
    assistant.handle.new_conversation().unwrap();
    sleep_ms(1600).await;
    assert_eq!(assistant.last_message().text, GREETING);
    assert_eq!(assistant.handle.state().snapshot().last_error, None);
}

// -- turns --

#[tokio::test(start_paused = true)]
async fn test_full_turn() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("hi there")).await;
    let greeting_only = assistant.messages().len();
    let stops = assistant.mic.stops();

    assistant.handle.stop_listening().unwrap();
    settle().await;
    assert_eq!(assistant.status(), TurnStatus::Ready);
    assert_eq!(assistant.mic.stops(), stops + 1);
    let starts_before = assistant.mic.starts();

    assistant.handle.send_text("hello").unwrap();
    settle().await;

    assert_eq!(assistant.status(), TurnStatus::Speaking);
    let messages = assistant.messages();
    assert_eq!(messages.len(), greeting_only + 2);
    let turn = &messages[greeting_only..];
    assert_eq!(turn[0].sender, Sender::User);
    assert_eq!(turn[0].text, "hello");
    assert_eq!(turn[1].sender, Sender::Assistant);
    assert_eq!(turn[1].text, "hi there");
    assert!(turn[1].is_typing);

    // Listening resumes only after speech ends
    assert_eq!(assistant.mic.starts(), starts_before);
    assistant.speaker.finish_current();
    settle().await;
    assert_eq!(assistant.mic.starts(), starts_before + 1);

    assert_eq!(
        assistant.statuses(),
        vec![
            TurnStatus::Ready,
            TurnStatus::Thinking,
            TurnStatus::Speaking,
            TurnStatus::Ready,
            TurnStatus::Listening,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_recognized_speech_drives_turn() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("sunny")).await;

    assistant.mic.say("what's the weather");
    settle().await;

    assert_eq!(assistant.last_message().text, "sunny");
    assert_eq!(
        assistant.speaker.spoken().last().map(String::as_str),
        Some("sunny")
    );

    let request = &assistant.client.requests()[0];
    assert!(!request.use_internet_context);
    assert!(request.prompt.contains(&format!("assistant: {}", GREETING)));
    assert!(request.prompt.contains("\n\nUser: what's the weather\n\n"));
    // The new text is not part of the context lines
    assert!(!request.prompt.contains("user: what's the weather"));

    let session_id = assistant.handle.state().session_id().unwrap();
    let stored = assistant.client.session(&session_id).unwrap();
    assert_eq!(
        stored.messages,
        vec![
            ConversationMessage::user("what's the weather"),
            ConversationMessage::assistant("sunny"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_context_window_is_six_messages() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;

    for i in 0..4 {
        assistant.handle.send_text(format!("question {}", i)).unwrap();
        settle().await;
        assistant.speaker.finish_current();
        settle().await;
    }

    let requests = assistant.client.requests();
    let last = &requests[3].prompt;
    let context_lines = last
        .lines()
        .filter(|l| l.starts_with("user: ") || l.starts_with("assistant: "))
        .count();
    assert_eq!(context_lines, 6);
    assert!(!last.contains(GREETING));
}

#[tokio::test(start_paused = true)]
async fn test_empty_reply_uses_fallback() {
    let client = InMemoryClient::new("ok");
    client.push_reply("   ");
    let assistant = TestAssistant::start_listening(client).await;

    assistant.handle.send_text("mumble").unwrap();
    settle().await;

    assert_eq!(assistant.last_message().text, NO_UNDERSTANDING_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn test_offline_short_circuit() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;
    let before = assistant.messages().len();
    assistant.online.set_online(false);

    assistant.mic.say("hello");
    settle().await;

    assert_eq!(assistant.client.invoke_count(), 0);
    let messages = assistant.messages();
    assert_eq!(messages.len(), before + 2);
    assert_eq!(messages[before].text, "hello");
    assert_eq!(messages[before + 1].text, OFFLINE_MESSAGE);
    assert_eq!(
        messages[before..].iter().filter(|m| m.is_assistant()).count(),
        1
    );

    // No automatic restart after the offline message
    let starts = assistant.mic.starts();
    assistant.speaker.finish_current();
    sleep_ms(3000).await;
    assert_eq!(assistant.mic.starts(), starts);
    assert_eq!(assistant.status(), TurnStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_no_overlapping_turns() {
    let client = InMemoryClient::new("done").with_reply_delay(Duration::from_secs(5));
    let assistant = TestAssistant::start_listening(client).await;

    assistant.mic.say("first");
    settle().await;
    assert_eq!(assistant.status(), TurnStatus::Thinking);

    assistant.handle.send_text("second").unwrap();
    assistant.handle.start_listening().unwrap();
    settle().await;
    assistant.mic.say("third");
    sleep_ms(6000).await;

    assert_eq!(assistant.client.invoke_count(), 1);
    let texts: Vec<String> = assistant.messages().into_iter().map(|m| m.text).collect();
    assert!(!texts.contains(&"second".to_string()));
    assert!(!texts.contains(&"third".to_string()));
    assert_eq!(texts.last().map(String::as_str), Some("done"));
}

// -- remote failures --

#[tokio::test(start_paused = true)]
async fn test_auth_failure_is_not_retried() {
    let client = InMemoryClient::new("ok");
    client.push_failure(TessaError::Http {
        status: 401,
        message: "unauthorized".to_string(),
    });
    let assistant = TestAssistant::start_listening(client).await;
    let starts = assistant.mic.starts();

    assistant.handle.send_text("hello").unwrap();
    settle().await;

    assert_eq!(assistant.client.invoke_count(), 1);
    let friendly = ErrorCategory::Auth.friendly_message();
    assert_eq!(assistant.last_message().text, friendly);
    assert!(assistant
        .handle
        .drain_events()
        .contains(&AssistantEvent::Error(friendly.to_string())));

    // No reply, so no listening restart is chained
    assistant.speaker.finish_current();
    sleep_ms(3000).await;
    assert_eq!(assistant.mic.starts(), starts);
}

#[tokio::test(start_paused = true)]
async fn test_answered_turn_clears_last_error() {
    let client = InMemoryClient::new("all good");
    client.push_failure(TessaError::Http {
        status: 403,
        message: "forbidden".to_string(),
    });
    let assistant = TestAssistant::start_listening(client).await;

    assistant.handle.send_text("first").unwrap();
    settle().await;
    assert_eq!(
        assistant.handle.state().snapshot().last_error.as_deref(),
        Some(ErrorCategory::Auth.friendly_message())
    );

    assistant.handle.send_text("second").unwrap();
    settle().await;
    assert_eq!(assistant.last_message().text, "all good");
    assert_eq!(assistant.handle.state().snapshot().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_retried_with_backoff() {
    let client = InMemoryClient::new("ok");
    client.push_failure(TessaError::Network("connection reset".to_string()));
    client.push_reply("recovered");
    let assistant = TestAssistant::start_listening(client).await;

    assistant.handle.send_text("hello").unwrap();
    settle().await;
    assert_eq!(assistant.client.invoke_count(), 1);
    assert_eq!(assistant.status(), TurnStatus::Thinking);

    sleep_ms(1000).await;
    settle().await;
    assert_eq!(assistant.client.invoke_count(), 2);
    assert_eq!(assistant.last_message().text, "recovered");
}

#[tokio::test(start_paused = true)]
async fn test_slow_llm_times_out() {
    let client = InMemoryClient::new("too late").with_reply_delay(Duration::from_secs(60));
    let assistant = TestAssistant::start_listening(client).await;

    assistant.handle.send_text("hello").unwrap();
    sleep_ms(29_000).await;
    assert_eq!(assistant.status(), TurnStatus::Thinking);

    sleep_ms(1_100).await;
    assert_eq!(
        assistant.last_message().text,
        ErrorCategory::Api.friendly_message()
    );
    assert_eq!(assistant.status(), TurnStatus::Speaking);
}

// -- recognition errors --

#[tokio::test(start_paused = true)]
async fn test_no_speech_restarts_after_delay() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;
    let starts = assistant.mic.starts();

    assistant.mic.fail("no-speech");
    settle().await;

    let notice = assistant.last_message();
    assert!(notice.text.contains("didn't hear anything"));
    assert_eq!(assistant.speaker.spoken().last(), Some(&notice.text));
    assert_eq!(assistant.mic.starts(), starts);

    sleep_ms(1000).await;
    settle().await;
    assert_eq!(assistant.mic.starts(), starts + 1);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_is_silent() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;
    let before = assistant.messages().len();
    let starts = assistant.mic.starts();

    assistant.mic.fail("aborted");
    sleep_ms(2000).await;

    assert_eq!(assistant.messages().len(), before);
    assert_eq!(assistant.mic.starts(), starts);
    assert_eq!(assistant.status(), TurnStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_does_not_restart() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;
    let starts = assistant.mic.starts();

    assistant.mic.fail("not-allowed");
    sleep_ms(2000).await;

    assert!(assistant.last_message().text.contains("permission"));
    assert_eq!(assistant.mic.starts(), starts);
}

#[tokio::test(start_paused = true)]
async fn test_error_after_manual_stop_is_ignored() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;
    let before = assistant.messages().len();
    let starts = assistant.mic.starts();

    assistant.handle.stop_listening().unwrap();
    settle().await;
    assistant.mic.fail("no-speech");
    sleep_ms(1500).await;

    assert_eq!(assistant.messages().len(), before);
    assert_eq!(assistant.mic.starts(), starts);
    assert!(assistant.speaker.spoken().iter().all(|t| t == GREETING));
    assert_eq!(assistant.status(), TurnStatus::Ready);
}

// -- transcript and lifecycle --

#[tokio::test(start_paused = true)]
async fn test_typing_completion_finalizes_once() {
    let assistant = TestAssistant::start(InMemoryClient::new("ok"));
    sleep_ms(1600).await;
    assistant.handle.drain_events();

    let greeting = assistant.last_message();
    assert!(greeting.is_typing);

    assistant.handle.finish_typing(greeting.id).unwrap();
    assistant.handle.finish_typing(greeting.id).unwrap();
    settle().await;

    let finalized: Vec<AssistantEvent> = assistant
        .handle
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, AssistantEvent::MessageFinalized(_)))
        .collect();
    assert_eq!(finalized.len(), 1);
    assert_eq!(assistant.messages().len(), 1);
    assert!(!assistant.last_message().is_typing);
}

#[tokio::test(start_paused = true)]
async fn test_new_conversation_clears_without_greeting() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;
    let first_session = assistant.handle.state().session_id();

    assistant.handle.new_conversation().unwrap();
    settle().await;

    assert!(assistant.messages().is_empty());
    assert_ne!(assistant.handle.state().session_id(), first_session);
    assert!(assistant
        .handle
        .drain_events()
        .contains(&AssistantEvent::TranscriptCleared));

    sleep_ms(3000).await;
    assert!(assistant.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_activity() {
    let assistant = TestAssistant::start_listening(InMemoryClient::new("ok")).await;

    // Schedules a restart that must never fire
    assistant.mic.fail("no-speech");
    settle().await;
    let starts = assistant.mic.starts();

    assistant.handle.shutdown().unwrap();
    settle().await;

    assert!(!assistant.handle.is_alive());
    assert!(assistant.speaker.cancels() >= 1);
    assert!(assistant
        .handle
        .drain_events()
        .contains(&AssistantEvent::Shutdown));

    sleep_ms(3000).await;
    assert_eq!(assistant.mic.starts(), starts);
    assert!(assistant.handle.send_text("anyone there?").is_err());

    assistant.task.await.unwrap();
}
