//! Planner agent: classifies and decomposes the user's question
//!
//! Produces a `QueryPlan` of atomic sub-tasks for the Cypher specialist.
//! Planning failures never propagate; a degraded single-task plan that
//! treats the whole question as one lookup is always produced instead.

use std::time::Instant;

use crate::llm::{generate_structured, AgentRole, ChatMessage, LlmClient, StructuredOutput};
use crate::workflow::state::{QueryComplexity, QueryPlan, SubTask};

/// Graph schema shared by the planner and specialist prompts.
pub const GRAPH_SCHEMA: &str = r#"## Neo4j Database Schema

### Node Labels and Properties

**Aquifer**
- OBJECTID: STRING (unique identifier)
- AquiferHydrogeologicClassification: STRING
- Basin: STRING
- Boundary_coordinates: STRING (WKT polygon)
- Cluster: INTEGER (clustering result)
- Continent: STRING
- Country: STRING
- Depth: FLOAT (depth in meters)
- Lake_area: FLOAT
- Location: POINT (spatial point)
- Parameter_area: FLOAT
- Parameter_shape: STRING
- Permeability: FLOAT (millidarcies)
- Porosity: FLOAT (0-1 coefficient)
- Recharge: FLOAT
- Thickness: FLOAT (meters)

**Basin** / **Country** / **Continent**
- name: STRING

### Relationships

- (Aquifer)-[:LOCATED_IN_BASIN]->(Basin)
- (Aquifer)-[:PART_OF]->(Cluster)
- (Basin)-[:IS_LOCATED_IN_COUNTRY]->(Country)
- (Country)-[:LOCATED_IN_CONTINENT]->(Continent)

### Full-text indexes

- basinSearch (Basin.name)
- countrySearch (Country.name)"#;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are the Planner Agent for a saline aquifer CO2 storage analytics system.

Your mission is to analyze user questions and create a structured execution plan.

## Classification Rules

Classify the query as:

**SIMPLE**: Direct lookups or basic filters
- Examples: "Show me aquifer 347", "List aquifers in Brazil"
- Sub-tasks: 1
- Pattern: Single MATCH query

**COMPOUND**: Multiple entities or comparisons
- Examples: "Compare aquifers in the Amazon Basin vs the Parnaiba Basin"
- Sub-tasks: 2-3
- Pattern: Multiple MATCH queries, possibly with aggregation

**ANALYTICAL**: Complex analysis requiring synthesis
- Examples: "Recommend best sites for a large CO2 storage project"
- Sub-tasks: 3-5
- Pattern: Multiple queries + filtering + ranking + analysis

## Output Format

Respond with a JSON object matching this structure:
{
    "complexity": "SIMPLE" | "COMPOUND" | "ANALYTICAL",
    "subtasks": [
        {
            "id": 1,
            "description": "Clear description of what to fetch",
            "dependencies": [<list of subtask IDs that must complete first>],
            "expected_output": "Type of data expected (e.g. 'list of aquifers', 'count')"
        }
    ],
    "reasoning": "Brief explanation of your planning decision",
    "estimated_execution_time": <seconds as float>
}

## Important Guidelines

1. Each subtask must map to a single Cypher query
2. Use dependencies when one query needs results from another
3. Break complex questions into atomic operations
4. Only plan for data that exists in the schema
5. Estimation baseline: simple=2s, compound=5s, analytical=10s

Now analyze the user's query and create an execution plan."#;

impl StructuredOutput for QueryPlan {
    const SCHEMA: &'static str = r#"{"complexity": "SIMPLE | COMPOUND | ANALYTICAL", "subtasks": [{"id": 1, "description": "string", "dependencies": [], "expected_output": "string"}], "reasoning": "string", "estimated_execution_time": 2.0}"#;
}

/// Result of the planning stage.
pub struct PlanOutcome {
    pub plan: QueryPlan,
    /// Set when planning degraded to the fallback plan; carries the cause
    pub degraded: Option<String>,
    pub duration_ms: f64,
}

/// Single-task plan used when planning fails or the model returns a
/// structurally unusable plan.
fn fallback_plan(user_query: &str, cause: &str) -> QueryPlan {
    let cause_short: String = cause.chars().take(100).collect();
    let reason = format!("Fallback plan due to error: {}", cause_short);
    QueryPlan {
        complexity: QueryComplexity::Simple,
        subtasks: vec![SubTask {
            id: 1,
            description: user_query.to_string(),
            dependencies: Vec::new(),
            expected_output: "data".to_string(),
        }],
        reasoning: reason,
        estimated_execution_time: 3.0,
    }
}

/// Reject plans the rest of the pipeline cannot execute: no sub-tasks,
/// duplicate ids, dependencies on unknown ids, or dependency cycles.
fn structural_defect(plan: &QueryPlan) -> Option<String> {
    if plan.subtasks.is_empty() {
        return Some("plan has no subtasks".to_string());
    }

    let ids: Vec<u32> = plan.subtasks.iter().map(|t| t.id).collect();
    let mut seen = std::collections::HashSet::new();
    for id in &ids {
        if !seen.insert(*id) {
            return Some(format!("duplicate subtask id {}", id));
        }
    }

    for task in &plan.subtasks {
        for dep in &task.dependencies {
            if !seen.contains(dep) {
                return Some(format!("subtask {} depends on unknown id {}", task.id, dep));
            }
        }
    }

    // Kahn's algorithm over the dependency edges
    let mut remaining: std::collections::HashMap<u32, Vec<u32>> = plan
        .subtasks
        .iter()
        .map(|t| (t.id, t.dependencies.clone()))
        .collect();
    loop {
        let ready: Vec<u32> = remaining
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| !remaining.contains_key(d)))
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            remaining.remove(&id);
        }
    }
    if !remaining.is_empty() {
        return Some("dependency cycle between subtasks".to_string());
    }

    None
}

/// Run the planner against the user query.
pub async fn plan_query(llm: &dyn LlmClient, user_query: &str) -> PlanOutcome {
    let started = Instant::now();
    tracing::info!(user_query, "planning query");

    let messages = vec![
        ChatMessage::system(format!("{}\n\n{}", PLANNER_SYSTEM_PROMPT, GRAPH_SCHEMA)),
        ChatMessage::user(format!(
            "Analyze this query and create an execution plan:\n\n{}",
            user_query
        )),
    ];

    match generate_structured::<QueryPlan>(llm, AgentRole::Planner, &messages, 0.1).await {
        Ok(plan) => {
            if let Some(defect) = structural_defect(&plan) {
                tracing::warn!(defect, "planner returned an unusable plan, using fallback");
                return PlanOutcome {
                    plan: fallback_plan(user_query, &defect),
                    degraded: Some(defect),
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                };
            }
            tracing::info!(
                complexity = ?plan.complexity,
                subtasks = plan.subtasks.len(),
                "plan created"
            );
            PlanOutcome {
                plan,
                degraded: None,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "planning failed, using fallback plan");
            PlanOutcome {
                plan: fallback_plan(user_query, &e.to_string()),
                degraded: Some(e.to_string()),
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            }
        }
    }
}
