//! HTTP API for the advisor

pub mod handlers;
pub mod routes;

pub use routes::{create_router, serve};
