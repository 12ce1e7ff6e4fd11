//! The four workflow agents plus the static Cypher checker
//!
//! Each agent is a free async function taking its inputs explicitly and
//! returning a typed outcome. Agents never touch `WorkflowState` directly;
//! the orchestrator composes their outcomes into it.

pub mod analyst;
pub mod cypher;
pub mod planner;
pub mod static_check;
pub mod validator;

pub use analyst::{analyze_results, AnalysisDegradation, AnalysisOutcome};
pub use cypher::{generate_queries, CypherOutcome};
pub use planner::{plan_query, PlanOutcome};
pub use static_check::{HeuristicCheck, StaticCheck};
pub use validator::{validate_queries, ValidationSummary, MAX_RETRIES};
