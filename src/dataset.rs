use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::model::QuestionRecord;

pub fn load_questions(path: &Path) -> Result<Vec<QuestionRecord>> {
    let file =
        File::open(path).with_context(|| format!("failed to open dataset: {}", path.display()))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_no = index + 1;
        let line = line
            .with_context(|| format!("failed to read {} line {line_no}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: QuestionRecord = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse {} line {line_no}", path.display()))?;
        records.push(record);
    }

    if records.is_empty() {
        bail!("dataset contains no records: {}", path.display());
    }

    Ok(records)
}
