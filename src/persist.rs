use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tracing::debug;

use crate::model::ResultRecord;
use crate::util::{local_date_string, write_json_pretty};

/// The date partition is fixed at construction so a run that crosses
/// midnight still writes into one day.
#[derive(Debug, Clone)]
pub struct ResultPersister {
    log_root: PathBuf,
    date_partition: String,
}

impl ResultPersister {
    pub fn new(log_root: impl Into<PathBuf>, date_partition: impl Into<String>) -> Self {
        Self {
            log_root: log_root.into(),
            date_partition: date_partition.into(),
        }
    }

    pub fn for_today(log_root: impl Into<PathBuf>) -> Self {
        Self::new(log_root, local_date_string())
    }

    pub fn date_partition(&self) -> &str {
        &self.date_partition
    }

    pub fn partition_dir(&self) -> PathBuf {
        self.log_root.join(&self.date_partition)
    }

    pub fn record_path(&self, experiment_name: &str) -> Result<PathBuf> {
        validate_experiment_name(experiment_name)?;
        Ok(self
            .partition_dir()
            .join(format!("{experiment_name}.json")))
    }

    pub fn save(&self, record: &ResultRecord) -> Result<PathBuf> {
        let path = self.record_path(&record.experiment_name)?;
        write_json_pretty(&path, record)?;
        debug!(path = %path.display(), "saved result record");
        Ok(path)
    }
}

fn validate_experiment_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("experiment name must not be empty");
    }
    if Path::new(name).is_absolute() {
        bail!("experiment name must be relative: {name}");
    }
    if name.split(['/', '\\']).any(|part| part.is_empty() || part == "..") {
        bail!("experiment name has an empty or parent segment: {name}");
    }
    Ok(())
}
