//! Neo4j client for executing generated Cypher
//!
//! Unlike a typed repository, this client runs model-generated queries whose
//! result shape is unknown ahead of time, so every row is deserialized into
//! JSON and normalized (spatial points, WKT strings, node property maps)
//! before it reaches the validator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    Graph,
};
use serde_json::Value;

use super::traits::{GraphStore, Row, StoreError};

/// Per-query execution timeout.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for Neo4j query execution.
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

impl Neo4jClient {
    /// Connect to Neo4j.
    pub async fn new(uri: &str, user: &str, password: &str) -> anyhow::Result<Self> {
        let graph = Graph::new(uri, user, password).await?;
        tracing::info!("connected to Neo4j at {}", uri);
        Ok(Self {
            graph: Arc::new(graph),
        })
    }
}

/// Convert a JSON value into a Bolt parameter value.
fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::Integer(BoltInteger::new(i))
            } else {
                BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let mut list = BoltList::default();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt_map = BoltMap::default();
            for (key, item) in map {
                bolt_map.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(bolt_map)
        }
    }
}

/// True if an object looks like a deserialized spatial point.
fn is_point_object(map: &serde_json::Map<String, Value>) -> bool {
    (map.contains_key("sr_id") || map.contains_key("srid"))
        && map.get("x").is_some_and(Value::is_number)
        && map.get("y").is_some_and(Value::is_number)
}

/// Normalize one result value.
///
/// Points collapse to plain `{x, y}` pairs; WKT geometry strings (POINT,
/// POLYGON, MULTIPOLYGON) pass through unchanged; nested containers are
/// normalized recursively.
fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if is_point_object(&map) {
                let mut point = serde_json::Map::new();
                if let Some(x) = map.get("x") {
                    point.insert("x".into(), x.clone());
                }
                if let Some(y) = map.get("y") {
                    point.insert("y".into(), y.clone());
                }
                Value::Object(point)
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, normalize_value(v)))
                        .collect(),
                )
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

#[async_trait]
impl GraphStore for Neo4jClient {
    async fn execute(
        &self,
        cypher: &str,
        params: &HashMap<String, Value>,
    ) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(cypher, param_count = params.len(), "executing Cypher");

        let mut q = query(cypher);
        for (key, value) in params {
            // Drop empty parameters; generated queries sometimes include
            // placeholders the model never filled in.
            if value.is_null() || value.as_str().is_some_and(str::is_empty) {
                continue;
            }
            q = q.param(key.as_str(), json_to_bolt(value));
        }

        let graph = self.graph.clone();
        let run = async move {
            let mut stream = graph
                .execute(q)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            let mut rows: Vec<Row> = Vec::new();
            while let Some(row) = stream
                .next()
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?
            {
                let value: Value = row
                    .to::<Value>()
                    .map_err(|e| StoreError::Query(e.to_string()))?;
                match normalize_value(value) {
                    Value::Object(map) => rows.push(map),
                    other => {
                        // Single unnamed column, wrap to keep the row shape
                        let mut map = Row::new();
                        map.insert("value".into(), other);
                        rows.push(map);
                    }
                }
            }
            Ok(rows)
        };

        match tokio::time::timeout(QUERY_TIMEOUT, run).await {
            Ok(result) => {
                if let Ok(rows) = &result {
                    tracing::debug!(row_count = rows.len(), "query executed");
                }
                result
            }
            Err(_) => {
                tracing::warn!(cypher, "query timed out");
                Err(StoreError::Timeout(QUERY_TIMEOUT))
            }
        }
    }
}
