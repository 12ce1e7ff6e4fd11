//! GraphStore trait definition
//!
//! Abstract interface for executing generated Cypher against the aquifer
//! graph. The validator depends only on this trait, enabling testing with
//! scripted mock implementations.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One result record: column name → normalized JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Errors surfaced by the graph store.
///
/// `Query` carries the raw provider message verbatim. The validator feeds it
/// back to the model as repair context, so it must not be rewrapped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Query(String),
}

/// Abstract interface for graph query execution.
///
/// Implementations must normalize values before returning rows: spatial
/// points become `{"x": …, "y": …}` objects, WKT geometry strings pass
/// through unchanged, and node values are flattened to their property maps.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a Cypher query with named parameters.
    async fn execute(
        &self,
        cypher: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Row>, StoreError>;
}
