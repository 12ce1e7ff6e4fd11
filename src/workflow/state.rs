//! Workflow state definitions
//!
//! All records passed between the four agents, plus the top-level
//! `WorkflowState` the orchestrator composes them into. Each agent produces
//! its own typed outcome; only the orchestrator writes `WorkflowState`
//! fields, each exactly once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ChatMessage;
use crate::store::Row;

/// Classification of query complexity by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryComplexity {
    /// Single straightforward query
    Simple,
    /// Multiple related queries
    Compound,
    /// Requires analysis and synthesis
    Analytical,
}

impl QueryComplexity {
    /// Wire-format name, as used in rendered output.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryComplexity::Simple => "SIMPLE",
            QueryComplexity::Compound => "COMPOUND",
            QueryComplexity::Analytical => "ANALYTICAL",
        }
    }
}

/// Status of Cypher query validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Query is valid and executed successfully
    Valid,
    /// Query was fixed by self-healing and then executed successfully
    Healed,
    /// Structural defects remained after the retry budget was spent
    SyntaxError,
    /// Store rejected the query after the retry budget was spent
    ExecutionError,
    /// Schema mismatch (wrong labels or relationships)
    SchemaError,
    /// Query execution timed out
    Timeout,
}

impl ValidationStatus {
    /// True for the two statuses that carry result rows.
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationStatus::Valid | ValidationStatus::Healed)
    }

    /// Wire-format name, as used in rendered output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "VALID",
            ValidationStatus::Healed => "HEALED",
            ValidationStatus::SyntaxError => "SYNTAX_ERROR",
            ValidationStatus::ExecutionError => "EXECUTION_ERROR",
            ValidationStatus::SchemaError => "SCHEMA_ERROR",
            ValidationStatus::Timeout => "TIMEOUT",
        }
    }
}

/// Importance / priority level used by insights and recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

/// Frontend visualization kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Table,
    Map,
    Chart,
    Stats,
}

/// One atomic unit of work from query decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Sequential id of the sub-task
    pub id: u32,
    /// What this sub-task needs to accomplish
    pub description: String,
    /// Ids of sub-tasks that must complete before this one
    #[serde(default)]
    pub dependencies: Vec<u32>,
    /// Expected type of result (e.g. "list of aquifers", "count")
    pub expected_output: String,
}

/// Output from the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub complexity: QueryComplexity,
    pub subtasks: Vec<SubTask>,
    /// Explanation of the planning decision
    pub reasoning: String,
    /// Estimated seconds to complete all tasks
    #[serde(default = "default_estimated_time")]
    pub estimated_execution_time: f64,
}

fn default_estimated_time() -> f64 {
    5.0
}

/// Generated Cypher query for one sub-task (1:1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CypherQuery {
    pub subtask_id: u32,
    pub cypher: String,
    /// Plain-English explanation of what the query does
    pub explanation: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// Expected column names in the result
    #[serde(default)]
    pub expected_columns: Vec<String>,
}

/// Result from validating and executing one generated query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub subtask_id: u32,
    pub status: ValidationStatus,
    pub original_query: String,
    /// Present only when a repair produced a query text different from the original
    pub healed_query: Option<String>,
    /// Present exactly for `Valid` / `Healed`; an empty list is a legitimate answer
    pub results: Option<Vec<Row>>,
    pub error_message: Option<String>,
    /// Self-healing repairs consumed (never exceeds the retry budget)
    pub retry_count: u32,
    pub execution_time_ms: f64,
    /// What was fixed during self-healing, if anything
    pub healing_explanation: Option<String>,
}

/// Individual insight from data analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub title: String,
    pub description: String,
    pub importance: Importance,
}

/// Actionable recommendation for the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub rationale: String,
    pub priority: Importance,
}

/// Hint for frontend visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationHint {
    #[serde(rename = "type")]
    pub kind: VisualizationKind,
    /// Key to access relevant data in the response
    pub data_key: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// Output from the analyst: findings synthesized into prescriptive advice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// High-level summary of findings
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    /// Caveats about data quality or limitations
    pub data_quality_notes: Option<String>,
    /// Suggested follow-up questions for deeper analysis
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    #[serde(default)]
    pub visualization_hints: Vec<VisualizationHint>,
}

/// Single step in the execution trace (expert mode only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTraceStep {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub input: Value,
    pub output: Value,
    pub duration_ms: f64,
    pub error: Option<String>,
}

/// Terminal state of one workflow run.
///
/// Created once per incoming query. Agents never touch this record; the
/// orchestrator composes their typed outcomes into it, so each output field
/// has exactly one writer.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    // Input
    pub user_query: String,
    pub session_id: Option<String>,
    /// If true, retain a detailed execution trace
    pub expert_mode: bool,

    // Conversation history (append-only)
    pub messages: Vec<ChatMessage>,

    // Agent outputs
    pub query_plan: Option<QueryPlan>,
    pub generated_queries: Option<Vec<CypherQuery>>,
    pub validation_results: Option<Vec<ValidationResult>>,
    pub analysis_report: Option<AnalysisReport>,

    // Control flow
    pub error_count: u32,
    pub all_queries_valid: bool,
    pub total_retries: u32,
    pub max_retries_exceeded: bool,

    // Final output
    pub final_response: Option<String>,
    pub execution_trace: Option<Vec<ExecutionTraceStep>>,

    // Metadata
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// Initial state for a new workflow run.
    pub fn new(
        user_query: impl Into<String>,
        session_id: Option<String>,
        expert_mode: bool,
        history: Vec<ChatMessage>,
    ) -> Self {
        Self {
            user_query: user_query.into(),
            session_id,
            expert_mode,
            messages: history,
            query_plan: None,
            generated_queries: None,
            validation_results: None,
            analysis_report: None,
            error_count: 0,
            all_queries_valid: false,
            total_retries: 0,
            max_retries_exceeded: false,
            final_response: None,
            execution_trace: if expert_mode { Some(Vec::new()) } else { None },
            start_time: Utc::now(),
            end_time: None,
        }
    }
}
