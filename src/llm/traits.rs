//! LlmClient trait definition
//!
//! Defines the abstract interface for text and structured generation.
//! All four agents go through this trait, enabling testing with mock
//! implementations and future backend swaps (e.g. Bedrock).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by an LLM backend.
///
/// `SchemaConformance` is raised at the generation boundary when the model's
/// output cannot be parsed into the requested structured type; callers never
/// see partially-parsed JSON.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request timed out for {role}")]
    Timeout { role: AgentRole },

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM provider error (status {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("LLM output did not match the requested schema: {0}")]
    SchemaConformance(String),
}

/// Agent roles, used to route each stage to its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Planner,
    CypherSpecialist,
    Validator,
    Analyst,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::CypherSpecialist => "cypher-specialist",
            AgentRole::Validator => "validator",
            AgentRole::Analyst => "analyst",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message in the Ollama chat format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Types that can be requested as structured model output.
///
/// `SCHEMA` is a JSON sketch embedded into the system instruction so the
/// model knows the exact shape to produce. Deserialization happens once, at
/// the generation boundary.
pub trait StructuredOutput: DeserializeOwned {
    const SCHEMA: &'static str;
}

/// Abstract interface for language-model backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a free-text response.
    async fn generate(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError>;

    /// Generate a response in JSON mode and parse it into a `Value`.
    ///
    /// Invalid JSON maps to [`LlmError::SchemaConformance`].
    async fn generate_json(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Generate a response conforming to a typed schema.
///
/// Prepends a schema instruction (merging into an existing system message if
/// present), calls the backend in JSON mode, and validates the result into
/// `T`. Any shape mismatch surfaces as a single `SchemaConformance` error.
pub async fn generate_structured<T: StructuredOutput>(
    llm: &dyn LlmClient,
    role: AgentRole,
    messages: &[ChatMessage],
    temperature: f32,
) -> Result<T, LlmError> {
    let instruction = format!(
        "You must respond with valid JSON matching this exact structure:\n\n{}\n\n\
         Return ONLY the JSON object, no additional text or markdown formatting.",
        T::SCHEMA
    );

    let mut enhanced: Vec<ChatMessage> = messages.to_vec();
    match enhanced.first_mut() {
        Some(first) if first.role == "system" => {
            first.content.push_str("\n\n");
            first.content.push_str(&instruction);
        }
        _ => enhanced.insert(0, ChatMessage::system(instruction)),
    }

    let value = llm.generate_json(role, &enhanced, temperature).await?;
    serde_json::from_value(value).map_err(|e| LlmError::SchemaConformance(e.to_string()))
}
