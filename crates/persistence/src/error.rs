//! ScyllaDB-tracer error type (§10.3): converts into the shared
//! `voice_agent_core::Error` at the boundary, same as every other backend
//! client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("scylla connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("query error: {0}")]
    Query(String),
}

impl From<PersistenceError> for voice_agent_core::Error {
    fn from(err: PersistenceError) -> Self {
        voice_agent_core::Error::Transport(err.to_string())
    }
}
