use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::RunCounts;
use crate::util::local_date_string;

#[derive(Debug, Deserialize)]
struct SavedResponse {
    #[serde(default)]
    response: Option<Value>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let date = args.date.clone().unwrap_or_else(local_date_string);
    let mode_dir = args
        .log_root
        .join(&date)
        .join(&args.suite)
        .join(args.mode.as_str());

    info!(path = %mode_dir.display(), "status requested");

    if !mode_dir.exists() {
        warn!(path = %mode_dir.display(), "no results saved for this mode and date");
        return Ok(());
    }

    let counts = summarize_mode_dir(&mode_dir)?;
    info!(
        date = %date,
        suite = %args.suite,
        mode = %args.mode,
        records = counts.record_count,
        answered = counts.answered,
        degraded = counts.degraded,
        "result summary"
    );

    Ok(())
}

pub fn summarize_mode_dir(mode_dir: &Path) -> Result<RunCounts> {
    let mut counts = RunCounts::default();
    visit(mode_dir, &mut counts)?;
    Ok(counts)
}

fn visit(dir: &Path, counts: &mut RunCounts) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        if file_type.is_dir() {
            visit(&path, counts)?;
            continue;
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !file_type.is_file() || !is_json {
            continue;
        }

        let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let saved: SavedResponse = match serde_json::from_slice(&raw) {
            Ok(saved) => saved,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable result record");
                continue;
            }
        };

        counts.record_count += 1;
        match saved.response {
            Some(value) if !value.is_null() => counts.answered += 1,
            _ => counts.degraded += 1,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_counts_answered_and_degraded_records() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = dir.path().join("examples").join("direct");
        fs::create_dir_all(mode_dir.join("nested")).unwrap();
        fs::write(mode_dir.join("q1.json"), r#"{"response":{"choices":[]}}"#).unwrap();
        fs::write(mode_dir.join("q2.json"), r#"{"response":null}"#).unwrap();
        fs::write(mode_dir.join("nested").join("q3.json"), r#"{"response":{}}"#).unwrap();
        fs::write(mode_dir.join("notes.txt"), "ignored").unwrap();
        fs::write(mode_dir.join("broken.json"), "{").unwrap();

        let counts = summarize_mode_dir(&mode_dir).unwrap();
        assert_eq!(counts.record_count, 3);
        assert_eq!(counts.answered, 2);
        assert_eq!(counts.degraded, 1);
    }
}
