//! The model-client boundary.
//!
//! The engine never talks to a provider directly: it hands an ordered
//! sequence of rendered parts to a [`ModelClient`] and gets back one
//! text string. Implementations must be safe for concurrent use, since
//! the runner shares a single client across all row workers.

use crate::error::ModelError;
use crate::types::RenderedPart;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Accepts a rendered multi-part prompt, returns raw model text.
///
/// Audio/image content arrives either as raw bytes or as a base64
/// string / provider-resolvable URI in a text payload; the engine does
/// not interpret URI schemes beyond passing them through.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, parts: &[RenderedPart]) -> Result<String, ModelError>;

    /// Identifier of the underlying model, for logs and reports.
    fn model_name(&self) -> &str;
}

/// One scripted mock reply.
#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Fail(ModelError),
}

/// Deterministic in-memory model client for tests and dry runs.
///
/// Replies are consumed from a queue in order; when the queue is empty
/// the fixed fallback response (if any) is returned, otherwise the
/// call fails. Call counting supports asserting that configuration
/// errors abort a run before any model invocation.
pub struct MockModelClient {
    model: String,
    script: Mutex<Vec<MockReply>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Mutex::new(Vec::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A client that always returns the given text.
    pub fn with_response(text: impl Into<String>) -> Self {
        let mut client = Self::new();
        client.fallback = Some(text.into());
        client
    }

    /// Queue a text reply for the next unanswered call.
    pub fn queue_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push(MockReply::Text(text.into()));
    }

    /// Queue a failure for the next unanswered call.
    pub fn queue_failure(&self, error: ModelError) {
        self.script.lock().unwrap().push(MockReply::Fail(error));
    }

    /// Number of `generate` calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockModelClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate(&self, _parts: &[RenderedPart]) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(ModelError::Provider {
                    message: "mock client has no scripted response".into(),
                }),
            };
        }
        match script.remove(0) {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(error) => Err(error),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_in_order_then_fallback() {
        let client = MockModelClient::with_response("fallback");
        client.queue_text("first");
        client.queue_failure(ModelError::EmptyResponse);

        assert_eq!(client.generate(&[]).await.unwrap(), "first");
        assert_eq!(
            client.generate(&[]).await.unwrap_err(),
            ModelError::EmptyResponse
        );
        assert_eq!(client.generate(&[]).await.unwrap(), "fallback");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn unscripted_client_without_fallback_fails() {
        let client = MockModelClient::new();
        assert!(client.generate(&[]).await.is_err());
    }
}
