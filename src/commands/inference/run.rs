use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::cli::RunArgs;
use crate::client::QueryClient;
use crate::client::retry::RetryPolicy;
use crate::client::transport::{ChatTransport, HttpTransport};
use crate::config::ApiConfig;
use crate::dataset::load_questions;
use crate::model::RunManifest;
use crate::persist::ResultPersister;
use crate::strategy::GridShape;
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

use super::batch::{BatchContext, run_batch};

pub fn run(args: RunArgs) -> Result<()> {
    let api = ApiConfig::new(
        &args.api_base,
        args.api_key.as_deref().unwrap_or_default(),
        Duration::from_secs(args.request_timeout_secs),
    )?;
    let transport = HttpTransport::new(&api)?;
    let persister = ResultPersister::for_today(&args.log_root);

    run_with_transport(&args, transport, &persister)?;
    Ok(())
}

pub fn run_with_transport<T: ChatTransport>(
    args: &RunArgs,
    transport: T,
    persister: &ResultPersister,
) -> Result<RunManifest> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let retry = RetryPolicy::new(
        args.max_attempts,
        Duration::from_secs(args.min_wait_secs),
        Duration::from_secs(args.max_wait_secs),
    )?;
    let grid = GridShape::new(args.grid_rows, args.grid_cols)?;
    let parallel = args.parallel.max(1);

    let records = load_questions(&args.data_file)?;
    let dataset_sha256 = sha256_file(&args.data_file)?;
    let client = QueryClient::new(transport, retry, args.image_detail)?;

    info!(
        run_id = %run_id,
        mode = %args.mode,
        model = %args.model,
        records = records.len(),
        parallel,
        partition = %persister.partition_dir().display(),
        "starting run"
    );

    let ctx = BatchContext {
        client: &client,
        persister,
        suite: &args.suite,
        model: &args.model,
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        grid,
    };
    let started = Instant::now();
    let counts = run_batch(&ctx, &records, args.mode, parallel)?;
    let duration_ms = started.elapsed().as_millis();

    let manifest = RunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        suite: args.suite.clone(),
        mode: args.mode.to_string(),
        model: args.model.clone(),
        parallel,
        date_partition: persister.date_partition().to_string(),
        dataset_path: args.data_file.display().to_string(),
        dataset_sha256,
        counts,
        duration_ms,
    };

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        default_manifest_path(persister, &args.suite, &args.mode.to_string(), started_ts)
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        answered = manifest.counts.answered,
        degraded = manifest.counts.degraded,
        skipped = manifest.counts.skipped,
        duration_ms,
        "run completed"
    );

    Ok(manifest)
}

fn default_manifest_path(
    persister: &ResultPersister,
    suite: &str,
    mode: &str,
    started_ts: chrono::DateTime<Utc>,
) -> PathBuf {
    let suite = suite.replace(['/', '\\'], "_");
    persister.partition_dir().join("manifests").join(format!(
        "run_{suite}_{mode}_{}.json",
        utc_compact_string(started_ts)
    ))
}
