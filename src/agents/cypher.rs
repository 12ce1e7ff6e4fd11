//! Cypher specialist agent: one query per plan sub-task
//!
//! Sub-tasks are independent at generation time, so queries are produced
//! with bounded concurrency and re-sorted into plan order afterwards. A
//! failed generation yields a safe fallback query rather than an error.

use std::collections::HashMap;
use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::llm::{generate_structured, AgentRole, ChatMessage, LlmClient, StructuredOutput};
use crate::workflow::state::{CypherQuery, QueryPlan, SubTask};

use super::planner::GRAPH_SCHEMA;

/// Concurrent generation calls in flight.
const GENERATION_CONCURRENCY: usize = 4;

/// Known-good query used when generation for a sub-task fails.
const FALLBACK_CYPHER: &str =
    "MATCH (a:Aquifer) RETURN a.OBJECTID, a.Porosity, a.Permeability, a.Depth LIMIT 10";

const CYPHER_SYSTEM_PROMPT: &str = r#"You are the Cypher Specialist Agent for a Neo4j-based saline aquifer database.

## Query Generation Rules

1. **Prioritize geographic filtering:** if a basin, country, or continent name is mentioned, use the appropriate full-text search first to find relevant aquifers.
2. **Access properties directly:** `a.PropertyName`.
3. **For OBJECTID queries:** use `MATCH (a:Aquifer {OBJECTID: "objectid"})`. OBJECTID is a string.
4. **Always return all core aquifer properties essential for CO2 storage analysis**, including `a.Porosity`, `a.Permeability`, `a.Thickness`, `a.Depth`, `a.Recharge`, `a.Lake_area`, `a.Parameter_area`, `a.AquiferHydrogeologicClassification`, `a.Boundary_coordinates`, `a.Cluster`, `a.Location`, `a.Parameter_shape`, and `a.OBJECTID`, regardless of whether the user explicitly mentions them.
5. **Always use explicit RETURN clauses** with specific property names. Include `a.OBJECTID` in all RETURN clauses.
6. **Do not perform calculations or transformations in RETURN clauses.** Only return existing properties.
7. **Use OPTIONAL MATCH** for relationships that might not exist.
8. **Avoid** map projections (`a { .* }`) and any write operation (CREATE, SET, DELETE, MERGE).
9. **Geographic search (basin, country, continent):**
   - Use full-text search for any geographic name.
   - Always include `YIELD node AS x, score` followed by `WHERE score > 0.5`.
   - For a single-entity focus (e.g. "the X basin"), add `ORDER BY score DESC LIMIT 1`.
   - For comparison queries (e.g. "Compare X and Y"), do NOT use `LIMIT 1`.
10. **Range queries:** express numerical ranges with comparison operators combined with AND.
11. **Do not add LIMIT** unless the user explicitly requests a specific number.

## Common Query Patterns

Aquifers in a specific basin (single-entity focus):
CALL db.index.fulltext.queryNodes("basinSearch", $basin_name)
YIELD node AS basin, score
WHERE score > 0.5
ORDER BY score DESC
LIMIT 1
MATCH (a:Aquifer)-[:LOCATED_IN_BASIN]->(basin)
RETURN a.OBJECTID, a.Porosity, a.Permeability, a.Thickness, a.Depth, a.Recharge, basin.name AS basin_name

Aquifer by OBJECTID:
MATCH (a:Aquifer {OBJECTID: $objectid})
RETURN a.OBJECTID, a.Porosity, a.Permeability, a.Thickness, a.Depth, a.Recharge

Compare basins (no LIMIT 1):
WITH ['Amazon', 'Parnaiba'] AS basinNames
UNWIND basinNames AS basinName
CALL db.index.fulltext.queryNodes("basinSearch", basinName)
YIELD node AS matchedBasin, score
WHERE score > 0.5
MATCH (a:Aquifer)-[:LOCATED_IN_BASIN]->(matchedBasin)
RETURN a.OBJECTID, a.Porosity, a.Permeability, a.Thickness, a.Depth, matchedBasin.name AS basin_name
ORDER BY basin_name

## Important Notes

- **No placeholders:** hardcode specific values mentioned in the query
- **Use parameters** only for generic filters
- **Think performance:** avoid queries that could return thousands of results

Now generate a Cypher query for the given sub-task."#;

impl StructuredOutput for CypherQuery {
    const SCHEMA: &'static str = r#"{"subtask_id": 1, "cypher": "<valid Cypher query>", "explanation": "what this query does", "parameters": {}, "expected_columns": ["column1", "column2"]}"#;
}

/// Result of the synthesis stage.
pub struct CypherOutcome {
    /// One query per sub-task, in plan order
    pub queries: Vec<CypherQuery>,
    /// Sub-tasks that fell back to the safe default query
    pub fallback_count: u32,
    pub duration_ms: f64,
}

fn fallback_query(subtask_id: u32, cause: &str) -> CypherQuery {
    let cause_short: String = cause.chars().take(100).collect();
    CypherQuery {
        subtask_id,
        cypher: FALLBACK_CYPHER.to_string(),
        explanation: format!("Fallback query due to error: {}", cause_short),
        parameters: HashMap::new(),
        expected_columns: vec![
            "a.OBJECTID".to_string(),
            "a.Porosity".to_string(),
            "a.Permeability".to_string(),
            "a.Depth".to_string(),
        ],
    }
}

async fn generate_for_subtask(
    llm: &dyn LlmClient,
    user_query: &str,
    plan: &QueryPlan,
    subtask: &SubTask,
) -> (CypherQuery, bool) {
    let messages = vec![
        ChatMessage::system(format!("{}\n\n{}", CYPHER_SYSTEM_PROMPT, GRAPH_SCHEMA)),
        ChatMessage::user(format!(
            "Generate a Cypher query for this sub-task:\n\n\
             **Sub-task ID**: {}\n\
             **Description**: {}\n\
             **Expected Output**: {}\n\
             **Dependencies**: {:?}\n\n\
             **Original User Query**: {}\n\n\
             **Query Complexity**: {:?}\n\n\
             Generate the Cypher query following all the rules and best practices.",
            subtask.id,
            subtask.description,
            subtask.expected_output,
            subtask.dependencies,
            user_query,
            plan.complexity,
        )),
    ];

    match generate_structured::<CypherQuery>(llm, AgentRole::CypherSpecialist, &messages, 0.1).await
    {
        Ok(mut query) => {
            // Models occasionally echo the wrong id; the plan is authoritative
            query.subtask_id = subtask.id;
            tracing::debug!(subtask_id = subtask.id, cypher = %query.cypher, "query generated");
            (query, false)
        }
        Err(e) => {
            tracing::error!(subtask_id = subtask.id, error = %e, "generation failed, using fallback query");
            (fallback_query(subtask.id, &e.to_string()), true)
        }
    }
}

/// Generate one Cypher query per plan sub-task.
pub async fn generate_queries(
    llm: &dyn LlmClient,
    user_query: &str,
    plan: &QueryPlan,
) -> CypherOutcome {
    let started = Instant::now();
    tracing::info!(subtasks = plan.subtasks.len(), "generating Cypher queries");

    let futures: Vec<_> = plan
        .subtasks
        .iter()
        .map(|subtask| generate_for_subtask(llm, user_query, plan, subtask))
        .collect();
    let results: Vec<(CypherQuery, bool)> = stream::iter(futures)
        .buffer_unordered(GENERATION_CONCURRENCY)
        .collect()
        .await;

    let fallback_count = results.iter().filter(|(_, degraded)| *degraded).count() as u32;
    let mut queries: Vec<CypherQuery> = results.into_iter().map(|(q, _)| q).collect();
    queries.sort_by_key(|q| q.subtask_id);

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    tracing::info!(
        count = queries.len(),
        fallback_count,
        duration_ms,
        "Cypher generation complete"
    );

    CypherOutcome {
        queries,
        fallback_count,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::workflow::state::QueryComplexity;
    use serde_json::json;

    fn plan_with(subtasks: Vec<SubTask>) -> QueryPlan {
        QueryPlan {
            complexity: QueryComplexity::Compound,
            subtasks,
            reasoning: "test".into(),
            estimated_execution_time: 5.0,
        }
    }

    fn subtask(id: u32, description: &str) -> SubTask {
        SubTask {
            id,
            description: description.into(),
            dependencies: Vec::new(),
            expected_output: "list of aquifers".into(),
        }
    }

    fn query_json(id: u32, cypher: &str) -> String {
        json!({
            "subtask_id": id,
            "cypher": cypher,
            "explanation": "test query",
            "parameters": {},
            "expected_columns": ["a.OBJECTID"]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_one_query_per_subtask_in_plan_order() {
        let llm = MockLlmClient::new();
        llm.set_default_reply(query_json(1, "MATCH (a:Aquifer) RETURN a.OBJECTID"));

        let plan = plan_with(vec![
            subtask(1, "aquifers in Amazon Basin"),
            subtask(2, "aquifers in Parnaiba Basin"),
            subtask(3, "count per basin"),
        ]);
        let outcome = generate_queries(&llm, "compare basins", &plan).await;

        assert_eq!(outcome.queries.len(), 3);
        assert_eq!(outcome.fallback_count, 0);
        let ids: Vec<u32> = outcome.queries.iter().map(|q| q.subtask_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(llm.call_count(AgentRole::CypherSpecialist), 3);
    }

    #[tokio::test]
    async fn test_wrong_echoed_subtask_id_is_overwritten() {
        let llm = MockLlmClient::new();
        llm.push_text(
            AgentRole::CypherSpecialist,
            query_json(99, "MATCH (a:Aquifer) RETURN a.OBJECTID"),
        );

        let plan = plan_with(vec![subtask(2, "lookup")]);
        let outcome = generate_queries(&llm, "q", &plan).await;

        assert_eq!(outcome.queries[0].subtask_id, 2);
    }

    #[tokio::test]
    async fn test_failed_generation_yields_fallback_query() {
        let llm = MockLlmClient::new();
        llm.push_failure(AgentRole::CypherSpecialist, "model unavailable");

        let plan = plan_with(vec![subtask(1, "lookup")]);
        let outcome = generate_queries(&llm, "q", &plan).await;

        assert_eq!(outcome.fallback_count, 1);
        assert_eq!(outcome.queries.len(), 1);
        assert_eq!(outcome.queries[0].cypher, FALLBACK_CYPHER);
        assert!(outcome.queries[0].explanation.contains("Fallback query"));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_queries() {
        let llm = MockLlmClient::new();
        // Order of delivery is not deterministic under concurrency, so use
        // one scripted failure plus a default success reply.
        llm.push_failure(AgentRole::CypherSpecialist, "boom");
        llm.set_default_reply(query_json(1, "MATCH (a:Aquifer) RETURN a.OBJECTID"));

        let plan = plan_with(vec![subtask(1, "a"), subtask(2, "b")]);
        let outcome = generate_queries(&llm, "q", &plan).await;

        assert_eq!(outcome.queries.len(), 2);
        assert_eq!(outcome.fallback_count, 1);
    }
}
