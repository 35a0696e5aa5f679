//! Offline model clients for dry runs.
//!
//! The CLI ships no provider transport; runs are driven by scripted
//! clients so a pipeline can be exercised end to end without
//! credentials or network access.

use anyhow::{Result, bail};
use async_trait::async_trait;
use verdict_core::{ModelError, ModelClient, RenderedPart};

/// Replies based on substring rules over the rendered text parts.
///
/// Rules are checked in order; the first whose pattern occurs
/// (case-insensitively) in the concatenated text content wins. Useful
/// for deterministic smoke runs of a template against a real dataset.
pub struct KeywordClient {
    rules: Vec<(String, String)>,
    fallback: String,
}

impl KeywordClient {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Parse `pattern=reply` rule specs from the command line.
    pub fn from_rule_specs(specs: &[String], fallback: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(fallback);
        for spec in specs {
            let Some((pattern, reply)) = spec.split_once('=') else {
                bail!("invalid rule '{spec}' (expected pattern=reply)");
            };
            client.rules.push((pattern.to_lowercase(), reply.to_string()));
        }
        Ok(client)
    }
}

#[async_trait]
impl ModelClient for KeywordClient {
    async fn generate(&self, parts: &[RenderedPart]) -> Result<String, ModelError> {
        let text: String = parts
            .iter()
            .filter_map(|p| p.content.as_text())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();

        for (pattern, reply) in &self.rules {
            if text.contains(pattern) {
                return Ok(reply.clone());
            }
        }
        Ok(self.fallback.clone())
    }

    fn model_name(&self) -> &str {
        "keyword-mock"
    }
}
