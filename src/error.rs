//! Crate-wide error taxonomy.
//!
//! Every storage, parsing, and pipeline failure maps to one of the
//! variants below. Upstream transport errors (KV, vector index,
//! embedding provider) are collapsed into [`Error::Upstream`] with the
//! component name preserved in the message; callers that need to react
//! differently to "bad request" vs "not found" vs "backend down" match
//! on the variant.

use thiserror::Error;

/// Unified error type for the store, parsers, pipeline, and cache.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed caller input: empty payload, invalid JSON
    /// or XML, unsupported content type, zero ids.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A point, segment, collection, or parser does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No registered parser accepts the payload under the requested
    /// content type.
    #[error("no parser for content type '{0}'")]
    ParserNotFound(String),

    /// Parsing succeeded but produced zero fragments; nothing was written.
    #[error("parser produced no fragments")]
    EmptyParse,

    /// The embedding provider returned a batch of the wrong length.
    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingMismatch { expected: usize, actual: usize },

    /// Transport or engine failure in the KV store, vector index, or
    /// embedding provider.
    #[error("{component} failure: {message}")]
    Upstream { component: &'static str, message: String },

    /// An observable violation of a store invariant, e.g. a half-edge.
    /// Carries the offending key for operator triage.
    #[error("store inconsistency at key '{key}': {message}")]
    Inconsistency { key: String, message: String },
}

impl Error {
    pub fn upstream(component: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Upstream {
            component,
            message: err.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::upstream("sqlite", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::upstream("serde", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
