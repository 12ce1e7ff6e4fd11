//! Static structural checks for generated Cypher
//!
//! Cheap text-level screening that runs before every execution attempt in
//! the validator loop. The checks are heuristic; the trait seam allows a
//! grammar-based checker to replace them without touching the retry loop.

use std::sync::LazyLock;

use regex::Regex;

/// Structural screening for a Cypher query.
///
/// Returns one message per defect found; an empty list means the query may
/// be sent to the store.
pub trait StaticCheck: Send + Sync {
    fn check(&self, cypher: &str) -> Vec<String>;
}

/// Write and admin operations that read-only analytics queries must never
/// contain. Matched case-insensitively on word boundaries.
static BLOCKED_TOKENS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        ("CREATE", r"(?i)\bCREATE\b"),
        ("DELETE", r"(?i)\bDELETE\b"),
        ("DETACH", r"(?i)\bDETACH\b"),
        ("SET", r"(?i)\bSET\b"),
        ("MERGE", r"(?i)\bMERGE\b"),
        ("REMOVE", r"(?i)\bREMOVE\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (Regex::new(pattern).unwrap(), name))
    .collect()
});

static GRAPH_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(MATCH|CALL)\b").unwrap());

static RETURN_CLAUSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bRETURN\b").unwrap());

/// Default text-level checker.
pub struct HeuristicCheck;

impl HeuristicCheck {
    /// Scan for unbalanced `()`, `[]` and `{}` with a single stack pass.
    /// Catches interleaving errors like `([)]` that per-character counting
    /// would miss.
    fn delimiter_errors(cypher: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut stack: Vec<char> = Vec::new();

        for ch in cypher.chars() {
            match ch {
                '(' | '[' | '{' => stack.push(ch),
                ')' | ']' | '}' => {
                    let expected = match ch {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        errors.push(format!("Unbalanced delimiter near '{}'", ch));
                        return errors;
                    }
                }
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            errors.push(format!("Unclosed delimiter '{}'", open));
        }
        errors
    }
}

impl StaticCheck for HeuristicCheck {
    fn check(&self, cypher: &str) -> Vec<String> {
        let trimmed = cypher.trim();
        if trimmed.is_empty() {
            return vec!["Empty query".to_string()];
        }

        let mut errors = Self::delimiter_errors(trimmed);

        if !GRAPH_CLAUSE.is_match(trimmed) {
            errors.push("Missing graph pattern clause (MATCH or CALL)".to_string());
        }

        if !RETURN_CLAUSE.is_match(trimmed) {
            errors.push("Missing RETURN clause".to_string());
        }

        for (pattern, name) in BLOCKED_TOKENS.iter() {
            if pattern.is_match(trimmed) {
                errors.push(format!("Write operation not allowed: {}", name));
            }
        }

        if trimmed.to_uppercase().contains("APOC.") {
            errors.push("Procedure library calls not allowed: apoc".to_string());
        }

        if trimmed.to_uppercase().contains("AQUIFIER") {
            errors.push("Label typo: 'Aquifier' should be 'Aquifer'".to_string());
        }

        errors
    }
}
