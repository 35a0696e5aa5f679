//! Data processors: per-row transforms that prepare raw or remote
//! content into model-consumable inline form.
//!
//! Processors run before templating, under the same bounded
//! concurrency as model calls, and their failures are isolated to the
//! row that raised them.

use crate::error::ProcessError;
use crate::types::{Row, Value};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::time::Duration;

/// A user-supplied `Row -> Row` transform.
///
/// Contract: idempotent on already-processed rows, and must not change
/// the row's key. The output row must contain every variable the
/// template references; the runner checks this after processing.
#[async_trait]
pub trait DataProcessor: Send + Sync {
    async fn process(&self, row: Row) -> Result<Row, ProcessError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "data-processor"
    }
}

/// Adapter turning a plain synchronous closure into a [`DataProcessor`].
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Row) -> Result<Row, ProcessError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> DataProcessor for FnProcessor<F>
where
    F: Fn(Row) -> Result<Row, ProcessError> + Send + Sync,
{
    async fn process(&self, row: Row) -> Result<Row, ProcessError> {
        (self.f)(row)
    }

    fn name(&self) -> &str {
        "fn-processor"
    }
}

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_BYTES: usize = 32 * 1024 * 1024;

/// Stock processor that resolves `Uri` cells into inline base64 text.
///
/// `http`/`https` URIs are fetched over a shared connection pool;
/// `file://` URIs and bare paths are read from disk. Non-URI cells are
/// left untouched, which also makes the processor idempotent.
pub struct MediaFetchProcessor {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl MediaFetchProcessor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn fetch_http(&self, uri: &str) -> Result<Vec<u8>, ProcessError> {
        let response = self
            .client
            .get(uri)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProcessError::Fetch {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;

        if let Some(length) = response.content_length() {
            if length as usize > self.max_bytes {
                return Err(ProcessError::TooLarge {
                    uri: uri.to_string(),
                    limit_bytes: self.max_bytes,
                });
            }
        }

        let body = response.bytes().await.map_err(|e| ProcessError::Fetch {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        if body.len() > self.max_bytes {
            return Err(ProcessError::TooLarge {
                uri: uri.to_string(),
                limit_bytes: self.max_bytes,
            });
        }
        Ok(body.to_vec())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, ProcessError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ProcessError::Read {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        if bytes.len() > self.max_bytes {
            return Err(ProcessError::TooLarge {
                uri: path.to_string(),
                limit_bytes: self.max_bytes,
            });
        }
        Ok(bytes)
    }

    async fn resolve(&self, uri: &str) -> Result<Vec<u8>, ProcessError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            self.fetch_http(uri).await
        } else if let Some(path) = uri.strip_prefix("file://") {
            self.read_file(path).await
        } else if uri.contains("://") {
            Err(ProcessError::UnsupportedScheme {
                uri: uri.to_string(),
            })
        } else {
            // Bare string: treat as a local path.
            self.read_file(uri).await
        }
    }
}

impl Default for MediaFetchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProcessor for MediaFetchProcessor {
    async fn process(&self, mut row: Row) -> Result<Row, ProcessError> {
        let uri_cells: Vec<(String, String)> = row
            .iter()
            .filter_map(|(name, value)| match value {
                Value::Uri { uri } => Some((name.to_string(), uri.clone())),
                _ => None,
            })
            .collect();

        for (name, uri) in uri_cells {
            tracing::debug!(row = %row.key, variable = %name, uri = %uri, "resolving media cell");
            let bytes = self.resolve(&uri).await?;
            row.set(name, Value::Text(STANDARD.encode(&bytes)));
        }
        Ok(row)
    }

    fn name(&self) -> &str {
        "media-fetch"
    }
}
