//! Crate-wide error type shared by every backend client and pipeline stage.
//!
//! The variants mirror the error-kind taxonomy of the gateway: transport
//! failures, non-OK upstream responses, malformed payloads, invalid client
//! input, admission-control rejection, router misses, and cancellation.
//! Each crate that talks to an external collaborator converts its own
//! `thiserror` type into this one at the boundary.

use thiserror::Error;

/// Result alias used throughout the gateway.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The underlying network call failed before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream responded with a non-2xx status. `body` is captured for
    /// diagnostics, truncated to the first 512 bytes per the propagation policy.
    #[error("remote status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// A response could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller supplied invalid input (e.g. malformed metadata frame).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Admission control refused a new session; the gateway is at capacity.
    #[error("at capacity")]
    AtCapacity,

    /// A `Router<T>` lookup found neither the requested engine nor a fallback.
    #[error("no backend for engine {0}")]
    NoBackend(String),

    /// The operation was cancelled because the owning session ended.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// True for failures that should end the current pipeline run but leave
    /// the session open for the next utterance (§7 propagation policy).
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::RemoteStatus { .. } | Error::Decode(_)
        )
    }
}
