//! API request handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::workflow::state::{ExecutionTraceStep, WorkflowState};
use crate::workflow::{run_workflow, AnalysisReport};
use crate::AppState;

/// Request body for POST /api/ask
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// The user's question
    pub message: String,
    /// Session id; a new one is generated when absent
    pub session_id: Option<String>,
    /// Include execution trace and query details in the response
    #[serde(default)]
    pub expert_mode: bool,
}

/// One trace entry in expert-mode responses.
#[derive(Debug, Serialize)]
pub struct TraceStepView {
    pub agent: String,
    pub duration_ms: f64,
    pub status: String,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Response body for POST /api/ask
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub session_id: String,
    pub response: String,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_trace: Option<Vec<TraceStepView>>,
}

fn trace_view(steps: &[ExecutionTraceStep]) -> Vec<TraceStepView> {
    steps
        .iter()
        .map(|step| TraceStepView {
            agent: step.agent.clone(),
            duration_ms: step.duration_ms,
            status: if step.error.is_some() {
                "error".to_string()
            } else {
                "success".to_string()
            },
            retry_count: step
                .output
                .get("total_retries")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            details: Some(step.output.clone()),
        })
        .collect()
}

fn metadata(state: &WorkflowState) -> Value {
    json!({
        "complexity": state.query_plan.as_ref().map(|p| p.complexity.as_str()),
        "queries_executed": state
            .validation_results
            .as_ref()
            .map(Vec::len)
            .unwrap_or(0),
        "total_retries": state.total_retries,
        "all_queries_valid": state.all_queries_valid,
    })
}

/// POST /api/ask handler. Runs the full workflow for one question.
pub async fn ask(
    State(app): State<AppState>,
    Json(request): Json<AskRequest>,
) -> impl IntoResponse {
    if request.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "message must not be empty" })),
        )
            .into_response();
    }

    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::info!(
        session_id,
        expert_mode = request.expert_mode,
        "processing question"
    );

    let state = run_workflow(
        &app,
        &request.message,
        Some(session_id.clone()),
        request.expert_mode,
    )
    .await;

    let response = AskResponse {
        session_id,
        response: state
            .final_response
            .clone()
            .unwrap_or_else(|| "I apologize, but I couldn't generate a response.".to_string()),
        metadata: metadata(&state),
        report: request
            .expert_mode
            .then(|| state.analysis_report.clone())
            .flatten(),
        execution_trace: state.execution_trace.as_deref().map(trace_view),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "agents": ["planner", "cypher-specialist", "validator", "analyst"],
    }))
}
