//! Workflow orchestration
//!
//! Drives the fixed stage sequence (plan, generate, validate, then either
//! analyze or error handling, then format) and composes each agent's typed
//! outcome into the `WorkflowState`. This is the only place state fields
//! are written.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::agents::{
    analyze_results, generate_queries, plan_query, validate_queries, AnalysisDegradation,
    HeuristicCheck, StaticCheck,
};
use crate::llm::{ChatMessage, LlmClient};
use crate::store::GraphStore;
use crate::AppState;

use super::formatter;
use super::state::{ExecutionTraceStep, WorkflowState};

/// Error budget across stages. More local failures than this routes the run
/// to error handling instead of analysis.
const MAX_ERRORS: u32 = 5;

enum Route {
    Analyze,
    HandleError,
}

/// The multi-agent pipeline, wired to a model backend and a graph store.
pub struct Workflow {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn GraphStore>,
    check: Box<dyn StaticCheck>,
}

impl Workflow {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn GraphStore>) -> Self {
        Self {
            llm,
            store,
            check: Box::new(HeuristicCheck),
        }
    }

    /// Replace the static checker, e.g. with a grammar-based one.
    pub fn with_check(mut self, check: Box<dyn StaticCheck>) -> Self {
        self.check = check;
        self
    }

    /// Run the full pipeline for one user query.
    ///
    /// Always returns a terminal state with `final_response` set; agent
    /// failures degrade, they do not propagate.
    pub async fn run(
        &self,
        user_query: &str,
        session_id: Option<String>,
        expert_mode: bool,
        history: Vec<ChatMessage>,
    ) -> WorkflowState {
        let mut state = WorkflowState::new(user_query, session_id, expert_mode, history);
        tracing::info!(user_query, expert_mode, "workflow started");

        // Stage 1: planning
        let plan_outcome = plan_query(self.llm.as_ref(), user_query).await;
        if plan_outcome.degraded.is_some() {
            state.error_count += 1;
        }
        trace_step(
            &mut state,
            "planner",
            json!({ "user_query": user_query }),
            serde_json::to_value(&plan_outcome.plan).unwrap_or(Value::Null),
            plan_outcome.duration_ms,
            plan_outcome.degraded.clone(),
        );
        let plan = plan_outcome.plan;
        state.query_plan = Some(plan.clone());

        // Stage 2: Cypher synthesis
        let cypher_outcome = generate_queries(self.llm.as_ref(), user_query, &plan).await;
        state.error_count += cypher_outcome.fallback_count;
        trace_step(
            &mut state,
            "cypher-specialist",
            serde_json::to_value(&plan).unwrap_or(Value::Null),
            json!({
                "queries": serde_json::to_value(&cypher_outcome.queries).unwrap_or(Value::Null),
                "fallback_count": cypher_outcome.fallback_count,
            }),
            cypher_outcome.duration_ms,
            (cypher_outcome.fallback_count > 0)
                .then(|| format!("{} queries fell back", cypher_outcome.fallback_count)),
        );
        let queries = cypher_outcome.queries;
        state.generated_queries = Some(queries.clone());

        // Stage 3: validation and execution
        let summary = validate_queries(
            self.llm.as_ref(),
            self.store.as_ref(),
            self.check.as_ref(),
            &queries,
        )
        .await;
        state.all_queries_valid = summary.all_valid;
        state.total_retries = summary.total_retries;
        state.max_retries_exceeded = summary.max_retries_exceeded;
        state.error_count += summary.failed;
        trace_step(
            &mut state,
            "validator",
            json!({ "query_count": queries.len() }),
            json!({
                "results": serde_json::to_value(&summary.outcomes).unwrap_or(Value::Null),
                "all_valid": summary.all_valid,
                "total_retries": summary.total_retries,
            }),
            summary.duration_ms,
            (summary.failed > 0).then(|| format!("{} queries failed", summary.failed)),
        );
        state.validation_results = Some(summary.outcomes);

        // Stage 4: conditional routing
        match self.route_after_validation(&state) {
            Route::Analyze => {
                let outcomes = state.validation_results.as_deref().unwrap_or(&[]);
                let outcome_count = outcomes.len();
                let analysis = analyze_results(
                    self.llm.as_ref(),
                    user_query,
                    state.query_plan.as_ref().map(|p| p.complexity),
                    outcomes,
                    state.total_retries,
                )
                .await;
                let error = match &analysis.degraded {
                    Some(AnalysisDegradation::ModelFailure(cause)) => {
                        state.error_count += 1;
                        Some(cause.clone())
                    }
                    Some(AnalysisDegradation::NoData) => Some("no successful results".to_string()),
                    None => None,
                };
                trace_step(
                    &mut state,
                    "analyst",
                    json!({ "outcome_count": outcome_count }),
                    serde_json::to_value(&analysis.report).unwrap_or(Value::Null),
                    analysis.duration_ms,
                    error,
                );
                state.analysis_report = Some(analysis.report);

                state.final_response = Some(formatter::render(&state));
            }
            Route::HandleError => {
                tracing::warn!(
                    error_count = state.error_count,
                    max_retries_exceeded = state.max_retries_exceeded,
                    "routing to error handling"
                );
                state.final_response = Some(formatter::render_error(&state));
            }
        }

        state.end_time = Some(Utc::now());
        tracing::info!(
            error_count = state.error_count,
            all_valid = state.all_queries_valid,
            "workflow finished"
        );
        state
    }

    /// Partial failure still goes to analysis; only an exhausted repair
    /// budget or a blown error budget aborts to error handling.
    fn route_after_validation(&self, state: &WorkflowState) -> Route {
        if state.all_queries_valid {
            tracing::info!("all queries valid, proceeding to analysis");
            Route::Analyze
        } else if state.max_retries_exceeded || state.error_count > MAX_ERRORS {
            Route::HandleError
        } else {
            tracing::info!("some queries failed, analyzing partial data");
            Route::Analyze
        }
    }
}

fn trace_step(
    state: &mut WorkflowState,
    agent: &str,
    input: Value,
    output: Value,
    duration_ms: f64,
    error: Option<String>,
) {
    if let Some(trace) = state.execution_trace.as_mut() {
        trace.push(ExecutionTraceStep {
            agent: agent.to_string(),
            timestamp: Utc::now(),
            input,
            output,
            duration_ms,
            error,
        });
    }
}

/// Run the workflow with the application's shared clients.
pub async fn run_workflow(
    app: &AppState,
    user_query: &str,
    session_id: Option<String>,
    expert_mode: bool,
) -> WorkflowState {
    Workflow::new(app.llm.clone(), app.store.clone())
        .run(user_query, session_id, expert_mode, Vec::new())
        .await
}
