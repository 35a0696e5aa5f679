//! Dataset loading: JSONL and CSV files into [`Dataset`] rows.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::Path;
use verdict_core::{Dataset, Row, RowKey, Value};

/// Load a dataset, dispatching on the file extension.
///
/// Columns named in `uri_columns` are treated as URI references for a
/// data processor to resolve; everything else loads as text.
pub fn load(path: &Path, uri_columns: &[String]) -> Result<Dataset> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") | Some("ndjson") => load_jsonl(path, uri_columns),
        Some("csv") => load_csv(path, uri_columns),
        other => bail!(
            "unsupported dataset extension {:?} for '{}' (expected .jsonl, .ndjson, or .csv)",
            other.unwrap_or(""),
            path.display()
        ),
    }
}

/// One JSON object per line; values must be strings or
/// `{"uri": ...}` / `{"bytes": [...]}` objects.
fn load_jsonl(path: &Path, uri_columns: &[String]) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset '{}'", path.display()))?;

    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: HashMap<String, Value> = serde_json::from_str(line)
            .with_context(|| format!("invalid record on line {} of '{}'", line_no + 1, path.display()))?;

        let mut row = Row::new(RowKey::positional(rows.len()));
        for (name, value) in record {
            let value = promote_uri(&name, value, uri_columns);
            row.set(name, value);
        }
        rows.push(row);
    }
    Ok(Dataset::new(rows))
}

/// Headered CSV; every cell loads as text unless its column is listed
/// in `uri_columns`.
fn load_csv(path: &Path, uri_columns: &[String]) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to read dataset '{}'", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (record_no, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("invalid CSV record {} in '{}'", record_no + 1, path.display()))?;
        let mut row = Row::new(RowKey::positional(rows.len()));
        for (header, field) in headers.iter().zip(record.iter()) {
            let value = promote_uri(header, Value::text(field), uri_columns);
            row.set(header, value);
        }
        rows.push(row);
    }
    Ok(Dataset::new(rows))
}

fn promote_uri(column: &str, value: Value, uri_columns: &[String]) -> Value {
    if uri_columns.iter().any(|c| c == column) {
        if let Value::Text(text) = value {
            return Value::uri(text);
        }
    }
    value
}
