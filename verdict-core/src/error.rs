//! Error taxonomy for the evaluation engine.
//!
//! Split by blast radius: `ConfigError` aborts a whole run before (or
//! instead of) producing results, `ProcessError` and `ModelError` are
//! internal failure causes inside a single row's pipeline, and
//! `RowError` is the per-row error surfaced in a
//! [`ClassificationResult`](crate::types::ClassificationResult).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration-class failures. Not row-specific: these indicate a
/// templating or setup mistake and abort the entire run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("rails must contain at least one label")]
    EmptyRails,

    #[error("rail at position {index} is blank")]
    BlankRail { index: usize },

    #[error("template must contain at least one prompt part")]
    NoParts,

    #[error("unbalanced braces in prompt part {part_index}")]
    UnbalancedBraces { part_index: usize },

    #[error("template variable '{variable}' missing from row {row}")]
    MissingVariable { variable: String, row: String },

    #[error("variable '{variable}' holds raw bytes and cannot be interpolated into text")]
    BytesInterpolation { variable: String },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Failures raised by a data processor while fetching or encoding one
/// row's content. Always isolated to that row.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to fetch '{uri}': {message}")]
    Fetch { uri: String, message: String },

    #[error("failed to read '{path}': {message}")]
    Read { path: String, message: String },

    #[error("'{uri}' exceeds the {limit_bytes} byte fetch limit")]
    TooLarge { uri: String, limit_bytes: usize },

    #[error("unsupported URI scheme in '{uri}'")]
    UnsupportedScheme { uri: String },

    #[error("{message}")]
    Other { message: String },
}

impl ProcessError {
    /// Convenience for user-supplied processors.
    pub fn other(message: impl Into<String>) -> Self {
        ProcessError::Other {
            message: message.into(),
        }
    }
}

/// Failures returned by a model client. The transient subset is
/// retried by the runner's backoff policy; the rest fail the row
/// immediately.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider connection failed: {message}")]
    Connection { message: String },

    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("provider error: {message}")]
    Provider { message: String },
}

impl ModelError {
    /// Whether the runner should retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimited { .. } | ModelError::Connection { .. } | ModelError::Timeout { .. }
        )
    }
}

/// The per-row error recorded in a classification result.
///
/// Serializable so result sets can be handed to external persistence
/// as-is. A parse miss is not an error and never appears here.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowError {
    #[error("data processing failed: {message}")]
    DataProcessing { message: String },

    #[error("model invocation failed: {message}")]
    ModelInvocation { message: String },

    #[error("row was cancelled before completion")]
    Cancelled,
}

impl RowError {
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::DataProcessing { .. } => "data_processing",
            RowError::ModelInvocation { .. } => "model_invocation",
            RowError::Cancelled => "cancelled",
        }
    }
}

impl From<ProcessError> for RowError {
    fn from(err: ProcessError) -> Self {
        RowError::DataProcessing {
            message: err.to_string(),
        }
    }
}

impl From<ModelError> for RowError {
    fn from(err: ModelError) -> Self {
        RowError::ModelInvocation {
            message: err.to_string(),
        }
    }
}
