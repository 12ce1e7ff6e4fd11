//! Mock graph store for testing the validator and workflow.
//!
//! Responses are scripted in FIFO order; when the queue runs out the store
//! returns the configured default (empty rows unless overridden). Every
//! executed query text is recorded for assertions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{GraphStore, Row, StoreError};

enum Scripted {
    Rows(Vec<Row>),
    Fail(String),
    TimedOut,
}

/// Scripted implementation of `GraphStore` for tests.
pub(crate) struct MockGraphStore {
    responses: Mutex<Vec<Scripted>>,
    executed: Mutex<Vec<String>>,
}

impl MockGraphStore {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push(Scripted::Rows(rows));
    }

    /// Queue an execution failure with a raw provider message.
    pub fn push_error(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push(Scripted::Fail(message.into()));
    }

    /// Queue a timeout.
    pub fn push_timeout(&self) {
        self.responses.lock().unwrap().push(Scripted::TimedOut);
    }

    /// All query texts executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Build a row from column/value pairs.
    pub fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn execute(
        &self,
        cypher: &str,
        _params: &HashMap<String, Value>,
    ) -> Result<Vec<Row>, StoreError> {
        self.executed.lock().unwrap().push(cypher.to_string());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(Vec::new());
        }
        match responses.remove(0) {
            Scripted::Rows(rows) => Ok(rows),
            Scripted::Fail(message) => Err(StoreError::Query(message)),
            Scripted::TimedOut => Err(StoreError::Timeout(Duration::from_secs(30))),
        }
    }
}
