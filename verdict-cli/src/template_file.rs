//! Template definition files (TOML) for the CLI.
//!
//! Example:
//!
//! ```toml
//! rails = ["positive", "neutral", "negative"]
//!
//! [[parts]]
//! content_type = "text"
//! template = "Classify the sentiment of: {text}"
//!
//! [[explanation]]
//! content_type = "text"
//! template = "You answered '{label}'. Explain why in one sentence."
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use verdict_core::{ClassificationTemplate, ExplanationTemplate, PromptPart};

#[derive(Debug, Deserialize)]
struct TemplateFile {
    rails: Vec<String>,
    parts: Vec<PromptPart>,
    explanation: Option<Vec<PromptPart>>,
}

/// Load and validate a classification template from a TOML file.
pub fn load(path: &Path) -> Result<ClassificationTemplate> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template '{}'", path.display()))?;
    let file: TemplateFile = toml::from_str(&content)
        .with_context(|| format!("invalid template file '{}'", path.display()))?;

    let mut builder = ClassificationTemplate::builder().rails(file.rails);
    for part in file.parts {
        builder = builder.part(part);
    }
    if let Some(parts) = file.explanation {
        builder = builder.explanation(
            ExplanationTemplate::new(parts)
                .with_context(|| format!("invalid explanation template in '{}'", path.display()))?,
        );
    }
    builder
        .build()
        .with_context(|| format!("invalid template in '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use verdict_core::ContentType;

    fn write_template(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_multi_part_template() {
        let (_dir, path) = write_template(
            r#"
rails = ["speech", "music", "silence"]

[[parts]]
content_type = "text"
template = "What does this clip contain?"

[[parts]]
content_type = "audio"
template = "{audio}"

[[explanation]]
content_type = "text"
template = "Why '{label}'?"
"#,
        );
        let template = load(&path).unwrap();
        assert_eq!(template.rails(), ["speech", "music", "silence"]);
        assert_eq!(template.parts()[1].content_type, ContentType::Audio);
        assert!(template.explanation().is_some());
    }

    #[test]
    fn rejects_unknown_content_type() {
        let (_dir, path) = write_template(
            r#"
rails = ["yes", "no"]

[[parts]]
content_type = "video"
template = "{clip}"
"#,
        );
        assert!(load(&path).is_err());
    }

    #[test]
    fn rejects_empty_rails() {
        let (_dir, path) = write_template(
            r#"
rails = []

[[parts]]
content_type = "text"
template = "{text}"
"#,
        );
        assert!(load(&path).is_err());
    }
}
