//! Result rendering: JSONL for piping, a plain table for terminals.

use anyhow::Result;
use verdict_core::RunOutput;

/// One JSON object per result row, aligned with the input dataset.
pub fn print_jsonl(output: &RunOutput) -> Result<()> {
    for result in &output.results {
        println!("{}", serde_json::to_string(result)?);
    }
    Ok(())
}

/// Human-readable table plus the run summary.
pub fn print_table(output: &RunOutput) {
    println!("{:<6} {:<16} {:<18} {}", "row", "label", "error", "response");
    println!("{}", "-".repeat(72));
    for (index, result) in output.results.iter().enumerate() {
        let label = result.label.as_deref().unwrap_or("-");
        let error = result
            .error
            .as_ref()
            .map(|e| e.kind().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<16} {:<18} {}",
            index,
            label,
            error,
            truncate(&result.raw_response, 40)
        );
        if let Some(explanation) = &result.explanation {
            println!("       explanation: {}", truncate(explanation, 60));
        }
    }
    print_summary(output);
}

/// Run summary, written to stderr so JSONL output stays clean.
pub fn print_summary(output: &RunOutput) {
    let report = &output.report;
    eprintln!(
        "run {} ({}): {} rows, {} labeled, {} parse misses, {} failed, {} cancelled",
        report.run_id,
        report.model,
        report.rows,
        report.labeled,
        report.parse_misses,
        report.failed,
        report.cancelled
    );
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let cut: String = single_line.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ααααα", 3), "ααα…");
        assert_eq!(truncate("line\nbreak", 20), "line break");
    }
}
