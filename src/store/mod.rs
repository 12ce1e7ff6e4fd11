//! Graph store client for the aquifer knowledge graph

pub mod client;
pub mod traits;

pub use client::Neo4jClient;
pub use traits::{GraphStore, Row, StoreError};

#[cfg(test)]
pub(crate) mod mock;
