//! Ollama chat-API client
//!
//! Talks to a locally-hosted Ollama instance, with one model per agent role.
//! Structured calls use Ollama's JSON mode (`"format": "json"`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::traits::{AgentRole, ChatMessage, LlmClient, LlmError};

/// Generous timeout, local models can be slow on first load.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_PLANNER_MODEL: &str = "llama3.2:3b";
const DEFAULT_CYPHER_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_VALIDATOR_MODEL: &str = "llama3.2:3b";
const DEFAULT_ANALYST_MODEL: &str = "llama3:8b";

/// Ollama connection settings with per-agent model selection.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub planner_model: String,
    pub cypher_model: String,
    pub validator_model: String,
    pub analyst_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            planner_model: DEFAULT_PLANNER_MODEL.into(),
            cypher_model: DEFAULT_CYPHER_MODEL.into(),
            validator_model: DEFAULT_VALIDATOR_MODEL.into(),
            analyst_model: DEFAULT_ANALYST_MODEL.into(),
        }
    }
}

impl LlmConfig {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OLLAMA_BASE_URL").unwrap_or(defaults.base_url),
            planner_model: std::env::var("PLANNER_MODEL").unwrap_or(defaults.planner_model),
            cypher_model: std::env::var("CYPHER_MODEL").unwrap_or(defaults.cypher_model),
            validator_model: std::env::var("VALIDATOR_MODEL").unwrap_or(defaults.validator_model),
            analyst_model: std::env::var("ANALYST_MODEL").unwrap_or(defaults.analyst_model),
        }
    }
}

/// Client for the Ollama `/api/chat` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    chat_endpoint: String,
    models: HashMap<AgentRole, String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static settings");

        let models = HashMap::from([
            (AgentRole::Planner, config.planner_model),
            (AgentRole::CypherSpecialist, config.cypher_model),
            (AgentRole::Validator, config.validator_model),
            (AgentRole::Analyst, config.analyst_model),
        ]);

        tracing::info!(base_url = %config.base_url, "initialized Ollama client");

        Self {
            http,
            chat_endpoint: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            models,
        }
    }

    fn model_for(&self, role: AgentRole) -> &str {
        // All four roles are inserted in `new`, so the lookup cannot miss.
        self.models
            .get(&role)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PLANNER_MODEL)
    }

    async fn call_chat(
        &self,
        role: AgentRole,
        payload: serde_json::Value,
    ) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.chat_endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { role }
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(%role, %status, "Ollama returned an error");
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let content = body
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::Provider {
                status: status.as_u16(),
                message: format!("empty response from model for {role}"),
            });
        }

        Ok(content)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let model = self.model_for(role);
        let mut options = json!({
            "temperature": temperature,
            "num_ctx": 8192,
            "top_k": 40,
            "top_p": 0.9,
            "repeat_penalty": 1.1,
        });
        if let Some(limit) = max_tokens {
            options["num_predict"] = json!(limit);
        }

        tracing::debug!(%role, model, message_count = messages.len(), "calling Ollama");

        self.call_chat(
            role,
            json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "options": options,
            }),
        )
        .await
    }

    async fn generate_json(
        &self,
        role: AgentRole,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError> {
        let model = self.model_for(role);

        tracing::debug!(%role, model, "calling Ollama (JSON mode)");

        let content = self
            .call_chat(
                role,
                json!({
                    "model": model,
                    "messages": messages,
                    "stream": false,
                    "format": "json",
                    "options": { "temperature": temperature, "num_ctx": 8192 },
                }),
            )
            .await?;

        serde_json::from_str(&content).map_err(|e| {
            tracing::error!(%role, "Ollama JSON mode returned invalid JSON");
            LlmError::SchemaConformance(format!("invalid JSON response: {e}"))
        })
    }
}
