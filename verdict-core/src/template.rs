//! Classification templates and prompt rendering.
//!
//! A [`ClassificationTemplate`] is an ordered sequence of
//! [`PromptPart`]s plus the rail set, built once and shared read-only
//! across every row of a run. Rendering substitutes `{var}`
//! placeholders from a row and is a pure, deterministic function.

use crate::error::ConfigError;
use crate::types::{ContentType, PromptPart, RenderedContent, RenderedPart, Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A parsed template string: literal runs and named placeholders.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Parse a template string into segments.
///
/// `{{` and `}}` escape literal braces. An unclosed `{`, a stray `}`,
/// or an empty `{}` placeholder is a malformed template.
fn parse_segments(template: &str) -> Result<Vec<Segment>, ()> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(()),
                        Some(c) => name.push(c),
                    }
                }
                if name.is_empty() {
                    return Err(());
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name));
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(());
                }
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn validate_parts(parts: &[PromptPart]) -> Result<(), ConfigError> {
    for (part_index, part) in parts.iter().enumerate() {
        parse_segments(&part.template)
            .map_err(|_| ConfigError::UnbalancedBraces { part_index })?;
    }
    Ok(())
}

fn collect_variables(parts: &[PromptPart], into: &mut BTreeSet<String>) {
    for part in parts {
        // Parts are validated at build time, so parsing cannot fail here.
        if let Ok(segments) = parse_segments(&part.template) {
            for segment in segments {
                if let Segment::Placeholder(name) = segment {
                    into.insert(name);
                }
            }
        }
    }
}

/// Render an ordered part sequence against a row.
///
/// Audio/image parts whose template is a single bare placeholder pass
/// `Bytes` cells through untouched; everywhere else a `Bytes` cell is
/// a templating mistake. `Uri` cells substitute as their URI string,
/// which the model client is expected to resolve.
fn render_parts(parts: &[PromptPart], row: &Row) -> Result<Vec<RenderedPart>, ConfigError> {
    let mut rendered = Vec::with_capacity(parts.len());

    for part in parts {
        let segments =
            parse_segments(&part.template).map_err(|_| ConfigError::UnbalancedBraces {
                part_index: rendered.len(),
            })?;

        // Media part holding exactly one placeholder: opaque pass-through.
        if part.content_type.is_media() {
            if let [Segment::Placeholder(name)] = segments.as_slice() {
                let value = row.get(name).ok_or_else(|| ConfigError::MissingVariable {
                    variable: name.clone(),
                    row: row.key.to_string(),
                })?;
                let content = match value {
                    Value::Bytes { bytes } => RenderedContent::Bytes(bytes.clone()),
                    Value::Text(s) => RenderedContent::Text(s.clone()),
                    Value::Uri { uri } => RenderedContent::Text(uri.clone()),
                };
                rendered.push(RenderedPart {
                    content_type: part.content_type,
                    content,
                });
                continue;
            }
        }

        let mut out = String::new();
        for segment in &segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = row.get(name).ok_or_else(|| ConfigError::MissingVariable {
                        variable: name.clone(),
                        row: row.key.to_string(),
                    })?;
                    match value {
                        Value::Text(s) => out.push_str(s),
                        Value::Uri { uri } => out.push_str(uri),
                        Value::Bytes { .. } => {
                            return Err(ConfigError::BytesInterpolation {
                                variable: name.clone(),
                            });
                        }
                    }
                }
            }
        }
        rendered.push(RenderedPart {
            content_type: part.content_type,
            content: RenderedContent::Text(out),
        });
    }

    Ok(rendered)
}

/// The follow-up prompt used to request an explanation for a label.
///
/// Rendered against the processed row plus an injected `label`
/// variable holding the parsed label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationTemplate {
    pub parts: Vec<PromptPart>,
}

impl ExplanationTemplate {
    pub fn new(parts: Vec<PromptPart>) -> Result<Self, ConfigError> {
        if parts.is_empty() {
            return Err(ConfigError::NoParts);
        }
        validate_parts(&parts)?;
        Ok(Self { parts })
    }

    /// A single text part, the common case.
    pub fn text(template: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(vec![PromptPart::text(template)])
    }

    pub fn render(&self, row: &Row) -> Result<Vec<RenderedPart>, ConfigError> {
        render_parts(&self.parts, row)
    }
}

/// A composed, multi-part prompt definition plus its rail set.
///
/// Immutable once built; the runner shares one instance read-only
/// across all concurrent row workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationTemplate {
    rails: Vec<String>,
    parts: Vec<PromptPart>,
    explanation: Option<ExplanationTemplate>,
}

impl ClassificationTemplate {
    pub fn builder() -> ClassificationTemplateBuilder {
        ClassificationTemplateBuilder::default()
    }

    /// The closed, ordered set of permitted labels. Order defines
    /// tie-break priority during response parsing.
    pub fn rails(&self) -> &[String] {
        &self.rails
    }

    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    pub fn explanation(&self) -> Option<&ExplanationTemplate> {
        self.explanation.as_ref()
    }

    /// All variable names referenced by the primary parts, sorted.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_variables(&self.parts, &mut names);
        names
    }

    /// Render the primary prompt against a row. Deterministic: the
    /// same template and row always yield identical parts, in part
    /// order.
    pub fn render(&self, row: &Row) -> Result<Vec<RenderedPart>, ConfigError> {
        render_parts(&self.parts, row)
    }
}

/// Builder for [`ClassificationTemplate`]. Validation happens in
/// [`build`](ClassificationTemplateBuilder::build) so a malformed
/// template can never reach a runner.
#[derive(Debug, Default)]
pub struct ClassificationTemplateBuilder {
    rails: Vec<String>,
    parts: Vec<PromptPart>,
    explanation: Option<ExplanationTemplate>,
}

impl ClassificationTemplateBuilder {
    pub fn rails<I, S>(mut self, rails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rails = rails.into_iter().map(Into::into).collect();
        self
    }

    pub fn part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn text_part(self, template: impl Into<String>) -> Self {
        self.part(PromptPart::text(template))
    }

    pub fn audio_part(self, template: impl Into<String>) -> Self {
        self.part(PromptPart::audio(template))
    }

    pub fn image_part(self, template: impl Into<String>) -> Self {
        self.part(PromptPart::image(template))
    }

    pub fn explanation(mut self, explanation: ExplanationTemplate) -> Self {
        self.explanation = Some(explanation);
        self
    }

    pub fn build(self) -> Result<ClassificationTemplate, ConfigError> {
        if self.rails.is_empty() {
            return Err(ConfigError::EmptyRails);
        }
        for (index, rail) in self.rails.iter().enumerate() {
            if rail.trim().is_empty() {
                return Err(ConfigError::BlankRail { index });
            }
        }
        if self.parts.is_empty() {
            return Err(ConfigError::NoParts);
        }
        validate_parts(&self.parts)?;

        Ok(ClassificationTemplate {
            rails: self.rails,
            parts: self.parts,
            explanation: self.explanation,
        })
    }
}
