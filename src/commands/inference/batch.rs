use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde_json::Map;
use tracing::{error, info, warn};

use crate::client::transport::ChatTransport;
use crate::client::{QueryClient, QueryOutcome, QueryRequest};
use crate::model::{QueryFailure, QuestionId, QuestionRecord, ResultRecord, RunCounts};
use crate::persist::ResultPersister;
use crate::strategy::{GridShape, Mode, Prompt};

pub struct BatchContext<'a, T> {
    pub client: &'a QueryClient<T>,
    pub persister: &'a ResultPersister,
    pub suite: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
    pub grid: GridShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Answered,
    Degraded,
    Skipped,
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Answered => "answered",
            Self::Degraded => "degraded",
            Self::Skipped => "skipped",
        })
    }
}

pub fn experiment_name(suite: &str, mode: Mode, question_id: &QuestionId) -> String {
    format!("{suite}/{mode}/{question_id}")
}

/// At most `parallel` records are in flight. Skips and exhausted retries
/// never abort the batch; a missing source image or unwritable log does.
pub fn run_batch<T: ChatTransport>(
    ctx: &BatchContext<'_, T>,
    records: &[QuestionRecord],
    mode: Mode,
    parallel: usize,
) -> Result<RunCounts> {
    let progress = Progress::new(records.len());

    let outcomes = if parallel <= 1 {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let outcome = process_record(ctx, mode, record)?;
            progress.tick(record, outcome);
            outcomes.push(outcome);
        }
        outcomes
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(parallel)
            .thread_name(|index| format!("query-worker-{index}"))
            .build()
            .context("failed to build query worker pool")?;

        pool.install(|| {
            records
                .par_iter()
                .map(|record| -> Result<RecordOutcome> {
                    let outcome = process_record(ctx, mode, record)?;
                    progress.tick(record, outcome);
                    Ok(outcome)
                })
                .collect::<Result<Vec<RecordOutcome>>>()
        })?
    };

    let mut counts = RunCounts {
        record_count: records.len(),
        ..RunCounts::default()
    };
    for outcome in outcomes {
        match outcome {
            RecordOutcome::Answered => counts.answered += 1,
            RecordOutcome::Degraded => counts.degraded += 1,
            RecordOutcome::Skipped => counts.skipped += 1,
        }
    }

    Ok(counts)
}

pub fn process_record<T: ChatTransport>(
    ctx: &BatchContext<'_, T>,
    mode: Mode,
    record: &QuestionRecord,
) -> Result<RecordOutcome> {
    let experiment = experiment_name(ctx.suite, mode, &record.question_id);
    if let Err(err) = ctx.persister.record_path(&experiment) {
        warn!(
            experiment = %experiment,
            error = %err,
            "question id cannot name a result file; skipping"
        );
        return Ok(RecordOutcome::Skipped);
    }

    let prompt = match mode.render(record, ctx.grid) {
        Prompt::Ready(prompt) => prompt,
        Prompt::Skip { missing } => {
            warn!(
                experiment = %experiment,
                path = %missing.display(),
                "processed image missing, run the grid overlay step first; skipping"
            );
            return Ok(RecordOutcome::Skipped);
        }
    };

    let request = QueryRequest {
        image_paths: &prompt.image_paths,
        question: &prompt.question,
        history: &prompt.history,
        model: ctx.model,
        temperature: ctx.temperature,
        max_tokens: ctx.max_tokens,
    };
    let outcome = ctx
        .client
        .query(&request)
        .with_context(|| format!("cannot query {experiment}"))?;

    let (response, failure, record_outcome) = match outcome {
        QueryOutcome::Answered(response) => (Some(response), None, RecordOutcome::Answered),
        QueryOutcome::Exhausted(exhausted) => {
            error!(experiment = %experiment, error = %exhausted, "api error");
            let failure = QueryFailure {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error.to_string(),
            };
            (None, Some(failure), RecordOutcome::Degraded)
        }
    };

    let mut auxiliary = Map::new();
    auxiliary.insert("ground_truth".to_string(), record.answer.clone());

    let result = ResultRecord {
        experiment_name: experiment,
        image_paths: prompt
            .image_paths
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        history: prompt.history,
        question: prompt.question,
        model: ctx.model.to_string(),
        temperature: ctx.temperature,
        response,
        failure,
        auxiliary,
    };
    ctx.persister.save(&result)?;

    Ok(record_outcome)
}

struct Progress {
    total: usize,
    completed: AtomicUsize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    fn tick(&self, record: &QuestionRecord, outcome: RecordOutcome) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            completed,
            total = self.total,
            question_id = %record.question_id,
            outcome = %outcome,
            "record finished"
        );
    }
}
