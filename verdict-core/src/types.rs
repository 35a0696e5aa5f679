//! Fundamental data types for the evaluation engine.
//!
//! Rows, cell values, rendered prompt parts, and per-row classification
//! results. Everything here is plain data: construction happens at the
//! edges (dataset loading, template definition), and the runner only
//! reads or clones these values.

use crate::error::RowError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Modality of a single prompt part.
///
/// Closed set: adding a modality requires an explicit variant here and
/// explicit handling in the model client. Unknown strings fail
/// deserialization rather than falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Audio,
    Image,
}

impl ContentType {
    /// Whether parts of this type carry opaque media content that the
    /// template layer passes through without inspection.
    pub fn is_media(&self) -> bool {
        matches!(self, ContentType::Audio | ContentType::Image)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Text => write!(f, "text"),
            ContentType::Audio => write!(f, "audio"),
            ContentType::Image => write!(f, "image"),
        }
    }
}

/// One immutable (content type, template string) pair.
///
/// The smallest unit of a prompt. Templates may contain `{var}`
/// placeholders resolved against a [`Row`] at render time; `{{` and
/// `}}` escape literal braces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPart {
    pub content_type: ContentType,
    pub template: String,
}

impl PromptPart {
    pub fn new(content_type: ContentType, template: impl Into<String>) -> Self {
        Self {
            content_type,
            template: template.into(),
        }
    }

    pub fn text(template: impl Into<String>) -> Self {
        Self::new(ContentType::Text, template)
    }

    pub fn audio(template: impl Into<String>) -> Self {
        Self::new(ContentType::Audio, template)
    }

    pub fn image(template: impl Into<String>) -> Self {
        Self::new(ContentType::Image, template)
    }
}

/// A cell value inside a row.
///
/// Deliberately a small closed variant rather than an open dynamic
/// record, so template-variable resolution stays checkable. `Uri`
/// cells are references that a data processor is expected to resolve
/// into inline content before the model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Uri { uri: String },
    Bytes { bytes: Vec<u8> },
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn uri(s: impl Into<String>) -> Self {
        Value::Uri { uri: s.into() }
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Value::Bytes { bytes: b.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Identity of a row: the original positional index, plus an optional
/// explicit key for tabular datasets. Processors must never change it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub index: usize,
    pub name: Option<String>,
}

impl RowKey {
    pub fn positional(index: usize) -> Self {
        Self { index, name: None }
    }

    pub fn named(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: Some(name.into()),
        }
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "#{}", self.index),
        }
    }
}

/// One unit of the input dataset: named variables plus an identity.
///
/// Rows are never shared across workers; the data-processor stage is
/// the only place a row is mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new(key: RowKey) -> Self {
        Self {
            key,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(name, value)` pairs. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Mutable access to the cell values, used by data processors that
    /// rewrite cells in place.
    pub fn values_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.values
    }
}

/// An ordered collection of rows. The unit the runner operates on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Build a dataset from record maps (tabular input). Row indices
    /// follow the input order.
    pub fn from_records(records: Vec<HashMap<String, Value>>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(index, values)| {
                let mut row = Row::new(RowKey::positional(index));
                for (name, value) in values {
                    row.set(name, value);
                }
                row
            })
            .collect();
        Self { rows }
    }

    /// Build a dataset from a flat list of scalar items, each bound to
    /// a single fixed variable name expected by the template.
    pub fn from_items(variable: &str, items: Vec<String>) -> Self {
        let rows = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Row::new(RowKey::positional(index)).with_value(variable, item))
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Resolved content of a rendered prompt part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderedContent {
    Text(String),
    Bytes(Vec<u8>),
}

impl RenderedContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RenderedContent::Text(s) => Some(s),
            RenderedContent::Bytes(_) => None,
        }
    }
}

/// One fully-resolved prompt part, ready for the model client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPart {
    pub content_type: ContentType,
    pub content: RenderedContent,
}

impl RenderedPart {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            content: RenderedContent::Text(content.into()),
        }
    }
}

/// Per-row output of a classification run.
///
/// Exactly one of these exists per input row, in input order. `label`
/// is `None` when the row errored or the response contained no rail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Option<String>,
    pub explanation: Option<String>,
    pub error: Option<RowError>,
    pub raw_response: String,
}

impl ClassificationResult {
    /// A successfully parsed label.
    pub fn labeled(label: impl Into<String>, raw_response: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            explanation: None,
            error: None,
            raw_response: raw_response.into(),
        }
    }

    /// The model answered but no rail appeared in the response.
    /// Surfaced, not retried: the raw text is kept for inspection.
    pub fn parse_miss(raw_response: impl Into<String>) -> Self {
        Self {
            label: None,
            explanation: None,
            error: None,
            raw_response: raw_response.into(),
        }
    }

    /// A row-level failure.
    pub fn failed(error: RowError) -> Self {
        Self {
            label: None,
            explanation: None,
            error: Some(error),
            raw_response: String::new(),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
