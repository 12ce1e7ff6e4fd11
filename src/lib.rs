//! Aquifer Advisor
//!
//! A multi-agent advisory service for CO2 storage site selection:
//! - Planner decomposes natural-language questions into sub-tasks
//! - Cypher specialist translates sub-tasks into Neo4j queries
//! - Validator executes queries with a self-healing repair loop
//! - Analyst turns result rows into prescriptive recommendations

pub mod agents;
pub mod api;
pub mod llm;
pub mod store;
pub mod workflow;

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use llm::{LlmConfig, OllamaClient};
use store::Neo4jClient;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub neo4j: Neo4jYamlConfig,
    pub llm: LlmYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "aquifer123".into(),
        }
    }
}

/// LLM configuration section (Ollama connection and per-agent models)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYamlConfig {
    pub base_url: Option<String>,
    pub planner_model: Option<String>,
    pub cypher_model: Option<String>,
    pub validator_model: Option<String>,
    pub analyst_model: Option<String>,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub llm: LlmConfig,
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);
        let llm_defaults = LlmConfig::default();

        Ok(Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            llm: LlmConfig {
                base_url: std::env::var("OLLAMA_BASE_URL")
                    .ok()
                    .or(yaml.llm.base_url)
                    .unwrap_or(llm_defaults.base_url),
                planner_model: std::env::var("PLANNER_MODEL")
                    .ok()
                    .or(yaml.llm.planner_model)
                    .unwrap_or(llm_defaults.planner_model),
                cypher_model: std::env::var("CYPHER_MODEL")
                    .ok()
                    .or(yaml.llm.cypher_model)
                    .unwrap_or(llm_defaults.cypher_model),
                validator_model: std::env::var("VALIDATOR_MODEL")
                    .ok()
                    .or(yaml.llm.validator_model)
                    .unwrap_or(llm_defaults.validator_model),
                analyst_model: std::env::var("ANALYST_MODEL")
                    .ok()
                    .or(yaml.llm.analyst_model)
                    .unwrap_or(llm_defaults.analyst_model),
            },
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::GraphStore>,
    pub llm: Arc<dyn llm::LlmClient>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state with all services initialized
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(
            Neo4jClient::new(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
            )
            .await?,
        );

        let llm = Arc::new(OllamaClient::new(config.llm.clone()));

        Ok(Self {
            store,
            llm,
            config: Arc::new(config),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_config_loading() {
        let yaml = r#"
server:
  port: 9090

neo4j:
  uri: bolt://db:7687
  user: admin
  password: secret

llm:
  base_url: http://ollama:11434
  cypher_model: qwen2.5-coder:14b
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.neo4j.uri, "bolt://db:7687");
        assert_eq!(config.neo4j.user, "admin");
        assert_eq!(config.llm.base_url, Some("http://ollama:11434".into()));
        assert_eq!(config.llm.cypher_model, Some("qwen2.5-coder:14b".into()));
        assert!(config.llm.planner_model.is_none());
    }

    #[test]
    fn test_yaml_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.neo4j.user, "neo4j");
        assert!(config.llm.base_url.is_none());
    }

    /// Combined test for YAML file loading, env var overrides, and defaults.
    /// Runs as a single test to avoid parallel env var race conditions.
    #[test]
    fn test_yaml_and_env_lifecycle() {
        fn clear_env() {
            for var in &[
                "NEO4J_URI",
                "NEO4J_USER",
                "NEO4J_PASSWORD",
                "OLLAMA_BASE_URL",
                "PLANNER_MODEL",
                "CYPHER_MODEL",
                "VALIDATOR_MODEL",
                "ANALYST_MODEL",
                "SERVER_PORT",
            ] {
                std::env::remove_var(var);
            }
        }

        // --- Phase 1: YAML values loaded correctly ---
        let yaml = r#"
server:
  port: 9999
neo4j:
  uri: bolt://yaml-host:7687
  user: yaml-user
  password: yaml-pass
llm:
  base_url: http://yaml-ollama:11434
"#;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        clear_env();

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.neo4j_uri, "bolt://yaml-host:7687");
        assert_eq!(config.neo4j_user, "yaml-user");
        assert_eq!(config.llm.base_url, "http://yaml-ollama:11434");
        // Models not set in YAML fall back to defaults
        assert_eq!(config.llm.cypher_model, "qwen2.5-coder:7b");

        // --- Phase 2: Env vars override YAML ---
        std::env::set_var("NEO4J_URI", "bolt://env-host:7687");
        std::env::set_var("SERVER_PORT", "7777");
        std::env::set_var("CYPHER_MODEL", "qwen2.5-coder:32b");

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.neo4j_uri, "bolt://env-host:7687");
        assert_eq!(config.server_port, 7777);
        assert_eq!(config.llm.cypher_model, "qwen2.5-coder:32b");
        // YAML value still used where no env override
        assert_eq!(config.neo4j_user, "yaml-user");

        clear_env();

        // --- Phase 3: No YAML file → defaults ---
        let nonexistent = Path::new("/tmp/nonexistent-config-12345.yaml");
        let config = Config::from_yaml_and_env(Some(nonexistent)).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.neo4j_uri, "bolt://localhost:7687");
        assert_eq!(config.llm.base_url, "http://localhost:11434");
    }
}
