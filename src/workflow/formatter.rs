//! Markdown rendering of the terminal workflow state
//!
//! Pure functions over `WorkflowState`: `render` for the success path,
//! `render_error` for the error-handling path. No model or store calls.

use chrono::Utc;

use super::state::{Importance, ValidationStatus, WorkflowState};

/// Render the final user-facing response from the analysis report.
///
/// Falls back to a generic apology when no report was produced.
pub fn render(state: &WorkflowState) -> String {
    let Some(report) = &state.analysis_report else {
        return "I encountered an error processing your request. Please try again.".to_string();
    };

    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("**Summary:**\n{}\n", report.summary));

    if !report.insights.is_empty() {
        parts.push("\n**Key Insights:**".to_string());
        for (i, insight) in report.insights.iter().enumerate() {
            let marker = match insight.importance {
                Importance::High => "🔴",
                Importance::Medium => "🟡",
                Importance::Low => "🟢",
            };
            parts.push(format!("{}. {} **{}**", i + 1, marker, insight.title));
            parts.push(format!("   {}", insight.description));
        }
    }

    if !report.recommendations.is_empty() {
        parts.push("\n**Recommendations:**".to_string());
        for (i, rec) in report.recommendations.iter().enumerate() {
            let marker = match rec.priority {
                Importance::High => "⚡",
                Importance::Medium => "📌",
                Importance::Low => "💡",
            };
            parts.push(format!("{}. {} {}", i + 1, marker, rec.action));
            parts.push(format!("   *{}*", rec.rationale));
        }
    }

    if !report.follow_up_questions.is_empty() {
        parts.push("\n**You might also want to ask:**".to_string());
        for question in &report.follow_up_questions {
            parts.push(format!("- {}", question));
        }
    }

    if state.expert_mode {
        parts.push("\n---\n**🔧 Expert Mode Details:**".to_string());

        if let Some(plan) = &state.query_plan {
            parts.push(format!("\n**Query Complexity:** {}", plan.complexity.as_str()));
            parts.push(format!("**Sub-tasks:** {}", plan.subtasks.len()));
        }

        if let Some(queries) = &state.generated_queries {
            parts.push("\n**Generated Cypher Queries:**".to_string());
            for (i, query) in queries.iter().enumerate() {
                parts.push(format!("\n{}. `{}`", i + 1, query.cypher));
                parts.push(format!("   *{}*", query.explanation));
            }
        }

        if let Some(results) = &state.validation_results {
            parts.push("\n**Validation Results:**".to_string());
            for result in results {
                let marker = match result.status {
                    ValidationStatus::Valid => "✅",
                    ValidationStatus::Healed => "🔄",
                    _ => "❌",
                };
                parts.push(format!(
                    "- {} {} ({:.0}ms)",
                    marker,
                    result.status.as_str(),
                    result.execution_time_ms
                ));
                if result.retry_count > 0 {
                    parts.push(format!("  Self-healing retries: {}", result.retry_count));
                }
            }
        }

        let duration = (Utc::now() - state.start_time).num_milliseconds() as f64 / 1000.0;
        parts.push(format!("\n**Total execution time:** {:.2}s", duration));
    }

    parts.join("\n")
}

/// Render the error-path response when validation failed terminally.
pub fn render_error(state: &WorkflowState) -> String {
    let mut parts: Vec<String> = vec![
        "I encountered some difficulties processing your query. Here's what happened:".to_string(),
        String::new(),
    ];

    if let Some(results) = &state.validation_results {
        let failed: Vec<_> = results.iter().filter(|r| !r.status.is_success()).collect();
        if !failed.is_empty() {
            parts.push("**Query Issues:**".to_string());
            for result in failed {
                parts.push(format!(
                    "- {}: {}",
                    result.status.as_str(),
                    result.error_message.as_deref().unwrap_or("Unknown error")
                ));
                if let Some(explanation) = &result.healing_explanation {
                    parts.push(format!("  Attempted fix: {}", explanation));
                }
            }
        }
    }

    parts.push("\n**Suggestions:**".to_string());
    parts.push("1. Try rephrasing your question".to_string());
    parts.push("2. Break complex queries into simpler parts".to_string());
    parts.push("3. Use Expert Mode to see detailed execution logs".to_string());

    if state.expert_mode {
        if let Some(queries) = &state.generated_queries {
            parts.push("\n**🔧 Attempted Queries:**".to_string());
            for query in queries {
                parts.push(format!("```cypher\n{}\n```", query.cypher));
            }
        }
    }

    parts.join("\n")
}
