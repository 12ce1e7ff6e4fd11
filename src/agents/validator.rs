//! Validator agent: static checks, execution, and self-healing
//!
//! Each generated query goes through a bounded repair loop: static check,
//! then execution, with the model asked to rewrite the query text whenever
//! either step fails. Repairs are sequential per query and use temperature
//! zero so healing stays reproducible.

use std::time::Instant;

use crate::llm::{AgentRole, ChatMessage, LlmClient};
use crate::store::GraphStore;
use crate::workflow::state::{CypherQuery, ValidationResult, ValidationStatus};

use super::static_check::StaticCheck;

/// Repair budget per query. A query gets at most this many rewrites before
/// the loop terminates with an error status.
pub const MAX_RETRIES: u32 = 3;

const VALIDATOR_HEALING_PROMPT: &str = r#"You are the Validator Agent. Your job is to fix broken Cypher queries.

## Common Issues and Fixes

### 1. Label Typos
- Wrong: `MATCH (a:Aquifier)`
- Right: `MATCH (a:Aquifer)`

### 2. Unknown Relationships
- Wrong: `MATCH (a)-[:CONTAINS]->(b)`
- Right: `MATCH (a)-[:LOCATED_IN_BASIN]->(b)` (use LOCATED_IN_BASIN, PART_OF, IS_LOCATED_IN_COUNTRY, or LOCATED_IN_CONTINENT)

### 3. Unknown Properties
- Wrong: `WHERE a.storage_capacity > 500`
- Right: `WHERE a.Parameter_area > 500`

### 4. Syntax Errors
- Wrong: `MATCH (a:Aquifer RETURN a`
- Right: `MATCH (a:Aquifer) RETURN a`

### 5. Missing Clauses
- Wrong: `MATCH (a:Aquifer) WHERE a.Depth > 1000`
- Right: `MATCH (a:Aquifer) WHERE a.Depth > 1000 RETURN a.OBJECTID, a.Depth`

## Valid Schema Reference

**Labels**: Aquifer, Basin, Country, Continent
**Relationships**: LOCATED_IN_BASIN, PART_OF, IS_LOCATED_IN_COUNTRY, LOCATED_IN_CONTINENT
**Aquifer Properties**: OBJECTID, AquiferHydrogeologicClassification, Basin, Boundary_coordinates, Cluster, Continent, Country, Depth, Lake_area, Location, Parameter_area, Parameter_shape, Permeability, Porosity, Recharge, Thickness
**Basin/Country/Continent Properties**: name

## Your Task

Given a broken Cypher query and its error message, fix the query.

**Rules**:
1. Return ONLY the corrected Cypher query, no explanation
2. Keep the query's intent intact
3. Use exact label and property names from the schema
4. Add LIMIT if the query might return many results
5. Use OPTIONAL MATCH for relationships that might not exist

Return just the corrected query."#;

/// Result of the validation stage across all queries.
pub struct ValidationSummary {
    pub outcomes: Vec<ValidationResult>,
    pub all_valid: bool,
    pub total_retries: u32,
    pub max_retries_exceeded: bool,
    /// Queries that ended in an error status
    pub failed: u32,
    pub duration_ms: f64,
}

/// Strip markdown code fences the model sometimes wraps around the query.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Ask the model to rewrite a broken query. On failure the original text is
/// returned unchanged so the loop can still make its final attempt.
async fn heal_query(llm: &dyn LlmClient, query: &str, error_message: &str) -> (String, String) {
    tracing::debug!(error_message, "attempting query repair");

    let messages = vec![
        ChatMessage::system(VALIDATOR_HEALING_PROMPT),
        ChatMessage::user(format!(
            "Fix this broken Cypher query:\n\n\
             **Query**:\n```cypher\n{}\n```\n\n\
             **Error**:\n{}\n\n\
             Return ONLY the corrected query.",
            query, error_message
        )),
    ];

    match llm
        .generate(AgentRole::Validator, &messages, 0.0, Some(500))
        .await
    {
        Ok(raw) => {
            let healed = strip_code_fences(&raw);
            let error_short: String = error_message.chars().take(100).collect();
            tracing::info!(healed = %healed, "query repaired");
            (healed, format!("Fixed: {}", error_short))
        }
        Err(e) => {
            tracing::error!(error = %e, "repair call failed, keeping query unchanged");
            (query.to_string(), format!("Healing failed: {}", e))
        }
    }
}

/// Validate and execute a single query with self-healing.
///
/// Per attempt: static check first, then execution. Either failure consumes
/// one repair from the budget; when the budget is spent the current failure
/// becomes the terminal status. An empty result set is still a success.
pub async fn validate_and_execute(
    llm: &dyn LlmClient,
    store: &dyn GraphStore,
    check: &dyn StaticCheck,
    cypher_query: &CypherQuery,
) -> ValidationResult {
    let mut current_query = cypher_query.cypher.clone();
    let mut retry_count: u32 = 0;
    let mut healing_explanation: Option<String> = None;

    tracing::info!(subtask_id = cypher_query.subtask_id, "validating query");

    loop {
        let syntax_errors = check.check(&current_query);

        if !syntax_errors.is_empty() {
            tracing::warn!(?syntax_errors, "static check failed");

            if retry_count >= MAX_RETRIES {
                return ValidationResult {
                    subtask_id: cypher_query.subtask_id,
                    status: ValidationStatus::SyntaxError,
                    original_query: cypher_query.cypher.clone(),
                    healed_query: healed_if_changed(&current_query, &cypher_query.cypher),
                    results: None,
                    error_message: Some(syntax_errors.join("; ")),
                    retry_count,
                    execution_time_ms: 0.0,
                    healing_explanation,
                };
            }

            let (repaired, explanation) =
                heal_query(llm, &current_query, &syntax_errors.join("; ")).await;
            current_query = repaired;
            healing_explanation = Some(explanation);
            retry_count += 1;
            continue;
        }

        let started = Instant::now();
        match store.execute(&current_query, &cypher_query.parameters).await {
            Ok(rows) => {
                let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
                tracing::info!(
                    subtask_id = cypher_query.subtask_id,
                    rows = rows.len(),
                    execution_time_ms,
                    "query executed"
                );

                let status = if retry_count > 0 {
                    ValidationStatus::Healed
                } else {
                    ValidationStatus::Valid
                };

                return ValidationResult {
                    subtask_id: cypher_query.subtask_id,
                    status,
                    original_query: cypher_query.cypher.clone(),
                    healed_query: healed_if_changed(&current_query, &cypher_query.cypher),
                    results: Some(rows),
                    error_message: None,
                    retry_count,
                    execution_time_ms,
                    healing_explanation,
                };
            }
            Err(e) => {
                let error_msg = e.to_string();
                tracing::error!(subtask_id = cypher_query.subtask_id, error = %error_msg, "execution failed");

                if retry_count >= MAX_RETRIES {
                    return ValidationResult {
                        subtask_id: cypher_query.subtask_id,
                        status: ValidationStatus::ExecutionError,
                        original_query: cypher_query.cypher.clone(),
                        healed_query: healed_if_changed(&current_query, &cypher_query.cypher),
                        results: None,
                        error_message: Some(error_msg),
                        retry_count,
                        execution_time_ms: 0.0,
                        healing_explanation,
                    };
                }

                let (repaired, explanation) = heal_query(llm, &current_query, &error_msg).await;
                current_query = repaired;
                healing_explanation = Some(explanation);
                retry_count += 1;
            }
        }
    }
}

fn healed_if_changed(current: &str, original: &str) -> Option<String> {
    if current != original {
        Some(current.to_string())
    } else {
        None
    }
}

/// Validate all generated queries in order.
///
/// Queries are processed sequentially so repair calls for one query never
/// interleave with another's.
pub async fn validate_queries(
    llm: &dyn LlmClient,
    store: &dyn GraphStore,
    check: &dyn StaticCheck,
    queries: &[CypherQuery],
) -> ValidationSummary {
    let started = Instant::now();
    tracing::info!(count = queries.len(), "validating queries");

    let mut outcomes = Vec::with_capacity(queries.len());
    let mut total_retries = 0;
    let mut all_valid = true;
    let mut max_retries_exceeded = false;

    for query in queries {
        let outcome = validate_and_execute(llm, store, check, query).await;
        total_retries += outcome.retry_count;
        if !outcome.status.is_success() {
            all_valid = false;
        }
        if outcome.retry_count >= MAX_RETRIES {
            max_retries_exceeded = true;
        }
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.status.is_success()).count() as u32;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    tracing::info!(
        valid = outcomes.len() as u32 - failed,
        total = outcomes.len(),
        total_retries,
        duration_ms,
        "validation complete"
    );

    ValidationSummary {
        outcomes,
        all_valid,
        total_retries,
        max_retries_exceeded,
        failed,
        duration_ms,
    }
}
