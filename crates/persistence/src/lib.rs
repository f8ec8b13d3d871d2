//! ScyllaDB-backed async tracer persistence (C14, §4.14).

pub mod client;
pub mod error;
pub mod schema;
pub mod tracer;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use tracer::AsyncTracer;
