//! Error types for writable endpoints.
//!
//! `WriteError` is cloned into every completion a failure fans out to, so sink
//! failures are carried behind an `Arc`.

use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a writable endpoint, either synchronously (argument
/// validation) or through completions and the `error` signal.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    #[error("Cannot call {op} after a stream was destroyed")]
    Destroyed { op: &'static str },

    #[error("write after end")]
    WriteAfterEnd,

    #[error("Cannot call {op} after a stream was finished")]
    AlreadyFinished { op: &'static str },

    #[error("Callback called multiple times")]
    MultipleCallback,

    #[error("The {method} method is not implemented")]
    NotImplemented { method: &'static str },

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Premature close")]
    PrematureClose,

    #[error("{0:#}")]
    Sink(Arc<anyhow::Error>),
}

impl WriteError {
    /// Wrap a sink-side failure.
    pub fn sink(err: impl Into<anyhow::Error>) -> Self {
        WriteError::Sink(Arc::new(err.into()))
    }

    /// Stable error code, one per variant.
    pub fn code(&self) -> &'static str {
        match self {
            WriteError::Destroyed { .. } => "ERR_STREAM_DESTROYED",
            WriteError::WriteAfterEnd => "ERR_STREAM_WRITE_AFTER_END",
            WriteError::AlreadyFinished { .. } => "ERR_STREAM_ALREADY_FINISHED",
            WriteError::MultipleCallback => "ERR_MULTIPLE_CALLBACK",
            WriteError::NotImplemented { .. } => "ERR_METHOD_NOT_IMPLEMENTED",
            WriteError::InvalidChunk(_) => "ERR_INVALID_ARG_TYPE",
            WriteError::UnknownEncoding(_) => "ERR_UNKNOWN_ENCODING",
            WriteError::PrematureClose => "ERR_STREAM_PREMATURE_CLOSE",
            WriteError::Sink(_) => "ERR_SINK",
        }
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, WriteError::Destroyed { .. })
    }
}

/// Errors raised while loading a [`WritableConfig`](crate::WritableConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

pub type Result<T, E = WriteError> = std::result::Result<T, E>;
