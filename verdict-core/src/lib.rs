//! # Verdict Core
//!
//! Evaluation engine that turns a dataset of heterogeneous inputs
//! (text, audio, image, or mixtures) into LLM-judged classification
//! labels constrained to a closed label set ("rails"), with optional
//! explanations.
//!
//! The pipeline: per-row data processing (fetch/normalize remote
//! media) → per-row template rendering → per-row model call with
//! bounded retry → rail parsing → aggregation aligned 1:1 with the
//! input dataset. Row failures are isolated; configuration mistakes
//! abort the whole run before any model call.

pub mod client;
pub mod error;
pub mod processor;
pub mod rails;
pub mod retry;
pub mod runner;
pub mod template;
pub mod types;

// Re-export commonly used types at the crate root.
pub use client::{MockModelClient, ModelClient};
pub use error::{ConfigError, ModelError, ProcessError, RowError};
pub use processor::{DataProcessor, FnProcessor, MediaFetchProcessor};
pub use retry::RetryConfig;
pub use runner::{ClassificationRunner, RunOutput, RunReport, RunnerConfig};
pub use template::{ClassificationTemplate, ClassificationTemplateBuilder, ExplanationTemplate};
pub use types::{
    ClassificationResult, ContentType, Dataset, PromptPart, RenderedContent, RenderedPart, Row,
    RowKey, Value,
};
