//! Analyst agent: turns result rows into prescriptive advice
//!
//! Builds a digest of the validation outcomes, asks the model for a
//! structured report, and degrades to a canned report when there is nothing
//! to analyze or the model call fails. Analysis errors never propagate.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use crate::llm::{generate_structured, AgentRole, ChatMessage, LlmClient, StructuredOutput};
use crate::workflow::state::{
    AnalysisReport, Importance, Insight, QueryComplexity, Recommendation, ValidationResult,
    VisualizationHint, VisualizationKind,
};

/// Rows per sub-task included in the model's digest.
const MAX_SAMPLE_ROWS: usize = 20;

const ANALYST_SYSTEM_PROMPT: &str = r#"You are the Analyst Agent for a CO2 storage site advisory system.

## Your Mission

Transform query results into PRESCRIPTIVE ANALYTICS. Tell users what to DO, not just what IS.

## Domain Context: CO2 Storage in Saline Aquifers

- Power plants emit 3-5 megatonnes (Mt) CO2/year
- Saline aquifers can permanently store CO2 underground
- Site selection requires balancing capacity, risk, and technical feasibility

### Key Technical Parameters

**Porosity** (0-1 scale): >0.20 excellent, 0.15-0.20 good, <0.15 poor.
**Permeability** (millidarcies): >200 excellent, 100-200 good, 50-100 moderate, <50 poor injection.
**Depth** (meters): >800m keeps CO2 supercritical; 800-1200m ideal; 1200-2500m good but higher pressure; >2500m expensive drilling.
**Thickness** (meters): thicker formations store more CO2 per unit area.
**Recharge**: higher recharge indicates active groundwater flow, relevant for plume migration.

### Suitability Heuristics

Ideal site: depth 800-2000m, porosity >0.18, permeability >100 md.
Acceptable site: depth >800m, porosity >0.12, permeability >50 md.
Avoid: depth <800m (CO2 will not stay supercritical) or permeability <50 md (injection too difficult).

## Analysis Guidelines

1. Be specific with numbers ("5 aquifers exceed the depth threshold, led by 347 at 1850m")
2. Provide context ("porosity of 0.23 is excellent: 23% of rock volume can store CO2")
3. Make actionable recommendations ("conduct a feasibility study on aquifer 347")
4. Prioritize by user intent (capacity, risk, or location focus)
5. Suggest concrete next steps

Now analyze the provided query results and generate your report."#;

impl StructuredOutput for AnalysisReport {
    const SCHEMA: &'static str = r#"{"summary": "2-3 sentence executive summary", "insights": [{"title": "string", "description": "string", "importance": "high | medium | low"}], "recommendations": [{"action": "string", "rationale": "string", "priority": "high | medium | low"}], "data_quality_notes": "string or null", "follow_up_questions": ["string"], "visualization_hints": [{"type": "table | map | chart | stats", "data_key": "string", "config": {}}]}"#;
}

/// Why a degraded report was produced instead of a model analysis.
pub enum AnalysisDegradation {
    /// No query produced results; the model was never called
    NoData,
    /// Data exists but the analysis call failed
    ModelFailure(String),
}

/// Result of the analysis stage.
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    /// Set when the report is a degraded stand-in
    pub degraded: Option<AnalysisDegradation>,
    pub duration_ms: f64,
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Textual digest of the validation outcomes for the model.
fn format_results_digest(outcomes: &[ValidationResult]) -> String {
    if outcomes.is_empty() {
        return "No data available.".to_string();
    }

    let mut parts = Vec::new();
    for outcome in outcomes {
        parts.push(format!("\n## Sub-task {} Results", outcome.subtask_id));

        if let Some(rows) = outcome.results.as_ref().filter(|_| outcome.status.is_success()) {
            parts.push(format!("Status: {}", outcome.status.as_str()));
            parts.push(format!("Execution time: {:.0}ms", outcome.execution_time_ms));
            parts.push(format!("Records returned: {}", rows.len()));

            if let Some(explanation) = &outcome.healing_explanation {
                parts.push(format!("Note: Query was auto-healed - {}", explanation));
            }

            if !rows.is_empty() {
                let shown = rows.len().min(MAX_SAMPLE_ROWS);
                parts.push(format!(
                    "\n### Data (showing first {} of {}):",
                    shown,
                    rows.len()
                ));
                for (idx, row) in rows.iter().take(MAX_SAMPLE_ROWS).enumerate() {
                    let formatted: Vec<String> = row
                        .iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| format!("{}={}", k, display_value(v)))
                        .collect();
                    parts.push(format!("{}. {}", idx + 1, formatted.join(", ")));
                }
                if rows.len() > MAX_SAMPLE_ROWS {
                    parts.push(format!("... and {} more records", rows.len() - MAX_SAMPLE_ROWS));
                }
            }
        } else {
            parts.push(format!(
                "Status: {} - {}",
                outcome.status.as_str(),
                outcome.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    parts.join("\n")
}

/// Report used when nothing executed successfully. Produced without a model
/// call.
fn empty_report() -> AnalysisReport {
    AnalysisReport {
        summary: "No data was retrieved successfully. Please check the query or try rephrasing \
                  your question."
            .to_string(),
        insights: Vec::new(),
        recommendations: vec![Recommendation {
            action: "Try rephrasing your question or simplifying the query".to_string(),
            rationale: "The database queries encountered errors or returned no results".to_string(),
            priority: Importance::High,
        }],
        data_quality_notes: Some(
            "All queries failed validation or returned empty results".to_string(),
        ),
        follow_up_questions: vec![
            "Could you rephrase your question?".to_string(),
            "Would you like to see what data is available in the database?".to_string(),
        ],
        visualization_hints: Vec::new(),
    }
}

/// Report used when data exists but the analysis call failed.
fn fallback_report(total_records: usize, successful: usize, cause: &str) -> AnalysisReport {
    let cause_short: String = cause.chars().take(100).collect();
    AnalysisReport {
        summary: format!(
            "Analysis completed. Retrieved {} records from {} successful queries.",
            total_records, successful
        ),
        insights: vec![Insight {
            title: "Data Retrieved Successfully".to_string(),
            description: format!("Found {} records matching your criteria", total_records),
            importance: Importance::Medium,
        }],
        recommendations: vec![Recommendation {
            action: "Review the raw results in expert mode".to_string(),
            rationale: "Automated analysis encountered an error, but data was retrieved \
                        successfully"
                .to_string(),
            priority: Importance::Medium,
        }],
        data_quality_notes: Some(format!("Automated analysis failed: {}", cause_short)),
        follow_up_questions: vec!["What specific aspect would you like me to analyze?".to_string()],
        visualization_hints: vec![VisualizationHint {
            kind: VisualizationKind::Table,
            data_key: "results".to_string(),
            config: HashMap::new(),
        }],
    }
}

/// Run the analyst over the validation outcomes.
pub async fn analyze_results(
    llm: &dyn LlmClient,
    user_query: &str,
    complexity: Option<QueryComplexity>,
    outcomes: &[ValidationResult],
    total_retries: u32,
) -> AnalysisOutcome {
    let started = Instant::now();
    tracing::info!(count = outcomes.len(), "analyzing results");

    let successful: Vec<&ValidationResult> = outcomes
        .iter()
        .filter(|o| o.status.is_success())
        .collect();

    // Nothing executed: skip the model entirely
    if successful.is_empty() {
        tracing::warn!("no successful results to analyze");
        return AnalysisOutcome {
            report: empty_report(),
            degraded: Some(AnalysisDegradation::NoData),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
    }

    let total_records: usize = successful
        .iter()
        .filter_map(|o| o.results.as_ref())
        .map(Vec::len)
        .sum();

    let messages = vec![
        ChatMessage::system(ANALYST_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Analyze these query results and provide prescriptive recommendations.\n\n\
             ## User's Original Question\n{}\n\n\
             ## Query Complexity\n{}\n\n\
             ## Query Results\n{}\n\n\
             ## Summary Stats\n\
             - Successful queries: {}/{}\n\
             - Total records retrieved: {}\n\
             - Query healing required: {} times\n\n\
             Provide a comprehensive analysis with specific, actionable insights and \
             recommendations. Focus on what the user should DO based on this data.",
            user_query,
            complexity
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            format_results_digest(outcomes),
            successful.len(),
            outcomes.len(),
            total_records,
            total_retries,
        )),
    ];

    match generate_structured::<AnalysisReport>(llm, AgentRole::Analyst, &messages, 0.3).await {
        Ok(report) => {
            tracing::info!(
                insights = report.insights.len(),
                recommendations = report.recommendations.len(),
                "analysis complete"
            );
            AnalysisOutcome {
                report,
                degraded: None,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "analysis failed, using fallback report");
            AnalysisOutcome {
                report: fallback_report(total_records, successful.len(), &e.to_string()),
                degraded: Some(AnalysisDegradation::ModelFailure(e.to_string())),
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::store::mock::MockGraphStore;
    use crate::workflow::state::ValidationStatus;
    use serde_json::json;

    fn success(subtask_id: u32, rows: Vec<crate::store::Row>) -> ValidationResult {
        ValidationResult {
            subtask_id,
            status: ValidationStatus::Valid,
            original_query: "MATCH (a:Aquifer) RETURN a.OBJECTID".into(),
            healed_query: None,
            results: Some(rows),
            error_message: None,
            retry_count: 0,
            execution_time_ms: 12.0,
            healing_explanation: None,
        }
    }

    fn failure(subtask_id: u32) -> ValidationResult {
        ValidationResult {
            subtask_id,
            status: ValidationStatus::ExecutionError,
            original_query: "MATCH (a:Aquifer) RETURN a.Bogus".into(),
            healed_query: None,
            results: None,
            error_message: Some("Unknown property".into()),
            retry_count: 3,
            execution_time_ms: 0.0,
            healing_explanation: None,
        }
    }

    fn report_json() -> String {
        json!({
            "summary": "One strong candidate found.",
            "insights": [
                {"title": "Aquifer 347 leads", "description": "Depth 1850m", "importance": "high"}
            ],
            "recommendations": [
                {"action": "Study aquifer 347", "rationale": "Best parameters", "priority": "high"}
            ],
            "data_quality_notes": null,
            "follow_up_questions": ["What is the permeability distribution?"],
            "visualization_hints": [
                {"type": "table", "data_key": "results", "config": {}}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_analysis_parses_structured_report() {
        let llm = MockLlmClient::new();
        llm.push_text(AgentRole::Analyst, report_json());

        let rows = vec![MockGraphStore::row(&[
            ("a.OBJECTID", json!("347")),
            ("a.Depth", json!(1850.0)),
        ])];
        let outcome = analyze_results(
            &llm,
            "best storage site?",
            Some(QueryComplexity::Analytical),
            &[success(1, rows)],
            0,
        )
        .await;

        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.report.insights.len(), 1);
        assert_eq!(outcome.report.recommendations[0].priority, Importance::High);
    }

    #[tokio::test]
    async fn test_no_successful_results_skips_model() {
        let llm = MockLlmClient::new();

        let outcome = analyze_results(&llm, "q", None, &[failure(1), failure(2)], 6).await;

        assert!(matches!(
            outcome.degraded,
            Some(AnalysisDegradation::NoData)
        ));
        assert!(outcome.report.summary.contains("No data was retrieved"));
        assert_eq!(llm.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_rows_still_invoke_model() {
        let llm = MockLlmClient::new();
        llm.push_text(AgentRole::Analyst, report_json());

        let outcome = analyze_results(&llm, "q", None, &[success(1, Vec::new())], 0).await;

        assert!(outcome.degraded.is_none());
        assert_eq!(llm.call_count(AgentRole::Analyst), 1);
    }

    #[tokio::test]
    async fn test_model_failure_yields_fallback_report() {
        let llm = MockLlmClient::new();
        llm.push_failure(AgentRole::Analyst, "model down");

        let rows = vec![MockGraphStore::row(&[("a.OBJECTID", json!("1"))])];
        let outcome = analyze_results(&llm, "q", None, &[success(1, rows)], 0).await;

        assert!(matches!(
            outcome.degraded,
            Some(AnalysisDegradation::ModelFailure(_))
        ));
        assert!(outcome.report.summary.contains("Retrieved 1 records"));
        assert!(outcome
            .report
            .data_quality_notes
            .as_deref()
            .is_some_and(|n| n.starts_with("Automated analysis failed")));
    }

    #[test]
    fn test_digest_samples_rows_and_reports_failures() {
        let rows: Vec<crate::store::Row> = (0..25)
            .map(|i| MockGraphStore::row(&[("a.OBJECTID", json!(i.to_string()))]))
            .collect();
        let digest = format_results_digest(&[success(1, rows), failure(2)]);

        assert!(digest.contains("## Sub-task 1 Results"));
        assert!(digest.contains("Records returned: 25"));
        assert!(digest.contains("showing first 20 of 25"));
        assert!(digest.contains("... and 5 more records"));
        assert!(digest.contains("## Sub-task 2 Results"));
        assert!(digest.contains("Unknown property"));
    }

    #[test]
    fn test_digest_skips_null_values() {
        let rows = vec![MockGraphStore::row(&[
            ("a.OBJECTID", json!("7")),
            ("a.Recharge", json!(null)),
        ])];
        let digest = format_results_digest(&[success(1, rows)]);
        assert!(digest.contains("a.OBJECTID=7"));
        assert!(!digest.contains("a.Recharge"));
    }
}
