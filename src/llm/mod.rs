//! LLM client abstraction for the agent pipeline
//!
//! Every pipeline stage talks to a language model through the [`LlmClient`]
//! trait. The concrete backend is Ollama's chat API; tests swap in a
//! scripted mock.

pub mod ollama;
pub mod traits;

pub use ollama::{LlmConfig, OllamaClient};
pub use traits::{
    generate_structured, AgentRole, ChatMessage, LlmClient, LlmError, StructuredOutput,
};

#[cfg(test)]
pub(crate) mod mock;
