//! In-process conversation client
//!
//! Keeps sessions in memory and answers LLM calls from a script. Unscripted
//! calls get the default reply, or an echo of the user text in loopback mode.

use super::{ConversationClient, LlmRequest, Session};
use crate::llm::context::ConversationMessage;
use crate::{Result, TessaError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const USER_MARKER: &str = "\n\nUser: ";
const CLOSING_MARKER: &str = "\n\nRespond naturally";

#[derive(Debug, Clone)]
enum Responder {
    Fixed(String),
    Loopback,
}

#[derive(Debug, Default)]
struct State {
    sessions: Vec<Session>,
    replies: VecDeque<Result<String>>,
    session_failures: VecDeque<TessaError>,
    requests: Vec<LlmRequest>,
}

pub struct InMemoryClient {
    state: Mutex<State>,
    responder: Responder,
    reply_delay: Option<Duration>,
    invoke_calls: AtomicUsize,
}

impl InMemoryClient {
    /// Client that answers every unscripted call with `default_reply`
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            responder: Responder::Fixed(default_reply.into()),
            reply_delay: None,
            invoke_calls: AtomicUsize::new(0),
        }
    }

    /// Client that echoes the user text back
    pub fn loopback() -> Self {
        Self {
            responder: Responder::Loopback,
            ..Self::new("")
        }
    }

    /// Wait this long before answering each LLM call
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = Some(delay);
        self
    }

    /// Seed a stored session
    pub fn with_session(self, session: Session) -> Self {
        self.state.lock().sessions.push(session);
        self
    }

    /// Queue the reply for the next LLM call
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.state.lock().replies.push_back(Ok(reply.into()));
    }

    /// Queue a failure for the next LLM call
    pub fn push_failure(&self, error: TessaError) {
        self.state.lock().replies.push_back(Err(error));
    }

    /// Fail the next session lookup or creation
    pub fn fail_next_session(&self, error: TessaError) {
        self.state.lock().session_failures.push_back(error);
    }

    pub fn invoke_count(&self) -> usize {
        self.invoke_calls.load(Ordering::SeqCst)
    }

    /// Every LLM request received so far
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.state.lock().requests.clone()
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.state.lock().sessions.iter().find(|s| s.id == id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    fn create_locked(state: &mut State, agent_name: &str) -> Session {
        let session = Session::new(Uuid::new_v4().to_string(), agent_name);
        state.sessions.push(session.clone());
        debug!("Created session {} for {}", session.id, agent_name);
        session
    }

    fn respond(&self, request: &LlmRequest) -> String {
        match &self.responder {
            Responder::Fixed(reply) => reply.clone(),
            Responder::Loopback => {
                let user_text = request
                    .prompt
                    .rfind(USER_MARKER)
                    .map(|start| &request.prompt[start + USER_MARKER.len()..])
                    .map(|rest| rest.split(CLOSING_MARKER).next().unwrap_or(rest))
                    .unwrap_or_default();
                format!("You said: {}", user_text)
            }
        }
    }
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::loopback()
    }
}

#[async_trait]
impl ConversationClient for InMemoryClient {
    async fn get_or_create_session(&self, agent_name: &str) -> Result<Session> {
        let mut state = self.state.lock();
        if let Some(error) = state.session_failures.pop_front() {
            return Err(error);
        }

        let latest = state
            .sessions
            .iter()
            .filter(|s| s.agent_name == agent_name)
            .max_by_key(|s| s.created_at)
            .cloned();

        match latest {
            Some(session) => {
                debug!("Resuming session {}", session.id);
                Ok(session)
            }
            None => Ok(Self::create_locked(&mut state, agent_name)),
        }
    }

    async fn create_session(&self, agent_name: &str) -> Result<Session> {
        let mut state = self.state.lock();
        if let Some(error) = state.session_failures.pop_front() {
            return Err(error);
        }
        Ok(Self::create_locked(&mut state, agent_name))
    }

    async fn append_message(&self, session_id: &str, message: ConversationMessage) -> Result<()> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| TessaError::Session(format!("unknown session {}", session_id)))?;
        session.messages.push(message);
        Ok(())
    }

    async fn invoke_llm(&self, request: &LlmRequest) -> Result<String> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.replies.pop_front()
        };

        if let Some(delay) = self.reply_delay {
            tokio::time::sleep(delay).await;
        }

        match scripted {
            Some(reply) => reply,
            None => Ok(self.respond(request)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompts::build_prompt;

    fn request(prompt: String) -> LlmRequest {
        LlmRequest {
            prompt,
            use_internet_context: false,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_resumes_latest() {
        let client = InMemoryClient::new("ok");
        let first = client.get_or_create_session("tessa_assistant").await.unwrap();
        let again = client.get_or_create_session("tessa_assistant").await.unwrap();
        assert_eq!(first.id, again.id);

        let fresh = client.create_session("tessa_assistant").await.unwrap();
        assert_ne!(fresh.id, first.id);
        assert_eq!(client.session_count(), 2);
    }

    #[tokio::test]
    async fn test_append_message() {
        let client = InMemoryClient::new("ok");
        let session = client.create_session("tessa_assistant").await.unwrap();
        client
            .append_message(&session.id, ConversationMessage::user("hello"))
            .await
            .unwrap();

        let stored = client.session(&session.id).unwrap();
        assert_eq!(stored.messages, vec![ConversationMessage::user("hello")]);

        let missing = client
            .append_message("nope", ConversationMessage::user("x"))
            .await;
        assert!(matches!(missing, Err(TessaError::Session(_))));
    }

    #[tokio::test]
    async fn test_scripted_replies_then_default() {
        let client = InMemoryClient::new("default");
        client.push_reply("first");
        client.push_failure(TessaError::Network("down".to_string()));

        let req = request("p".to_string());
        assert_eq!(client.invoke_llm(&req).await.unwrap(), "first");
        assert!(client.invoke_llm(&req).await.is_err());
        assert_eq!(client.invoke_llm(&req).await.unwrap(), "default");
        assert_eq!(client.invoke_count(), 3);
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_loopback_echoes_user_text() {
        let client = InMemoryClient::loopback();
        let prompt = build_prompt(&[ConversationMessage::user("earlier")], "hello there");
        assert_eq!(
            client.invoke_llm(&request(prompt)).await.unwrap(),
            "You said: hello there"
        );
    }

    #[tokio::test]
    async fn test_session_failure_is_one_shot() {
        let client = InMemoryClient::new("ok");
        client.fail_next_session(TessaError::Network("offline".to_string()));
        assert!(client.get_or_create_session("tessa_assistant").await.is_err());
        assert!(client.get_or_create_session("tessa_assistant").await.is_ok());
    }
}
