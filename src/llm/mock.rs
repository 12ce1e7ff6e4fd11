//! Mock LLM client for testing pipeline stages.
//!
//! Replies are scripted per role and consumed in FIFO order. When a role's
//! queue is empty the mock returns the configured default, or a transport
//! error if none is set.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{AgentRole, ChatMessage, LlmClient, LlmError};

enum Reply {
    Text(String),
    Fail(String),
    TimedOut,
}

/// Scripted implementation of `LlmClient` for tests.
pub(crate) struct MockLlmClient {
    replies: Mutex<HashMap<AgentRole, VecDeque<Reply>>>,
    default_reply: Mutex<Option<String>>,
    calls: Mutex<Vec<AgentRole>>,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            default_reply: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text reply for a role.
    pub fn push_text(&self, role: AgentRole, text: impl Into<String>) {
        self.push(role, Reply::Text(text.into()));
    }

    /// Queue a transport failure for a role.
    pub fn push_failure(&self, role: AgentRole, message: impl Into<String>) {
        self.push(role, Reply::Fail(message.into()));
    }

    /// Queue a timeout for a role.
    pub fn push_timeout(&self, role: AgentRole) {
        self.push(role, Reply::TimedOut);
    }

    /// Reply returned whenever a role's queue is empty.
    pub fn set_default_reply(&self, text: impl Into<String>) {
        *self.default_reply.lock().unwrap() = Some(text.into());
    }

    /// Number of calls made for a given role (text and JSON combined).
    pub fn call_count(&self, role: AgentRole) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| **r == role).count()
    }

    /// Total number of calls across all roles.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Messages passed to the most recent call.
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }

    fn push(&self, role: AgentRole, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(reply);
    }

    fn next_reply(&self, role: AgentRole, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(role);
        *self.last_messages.lock().unwrap() = messages.to_vec();

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&role)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(LlmError::Transport(message)),
            Some(Reply::TimedOut) => Err(LlmError::Timeout { role }),
            None => match self.default_reply.lock().unwrap().clone() {
                Some(text) => Ok(text),
                None => Err(LlmError::Transport(format!(
                    "mock has no scripted reply for {role}"
                ))),
            },
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        self.next_reply(role, messages)
    }

    async fn generate_json(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<serde_json::Value, LlmError> {
        let content = self.next_reply(role, messages)?;
        serde_json::from_str(&content)
            .map_err(|e| LlmError::SchemaConformance(format!("invalid JSON response: {e}")))
    }
}
