use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::client::conversation::ImageDetail;
use crate::client::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_WAIT_SECS, DEFAULT_MIN_WAIT_SECS};
use crate::config::{API_KEY_ENV, DEFAULT_API_BASE};
use crate::strategy::{DEFAULT_GRID_COLS, DEFAULT_GRID_ROWS, Mode};

#[derive(Parser, Debug)]
#[command(
    name = "scaffold-eval",
    version,
    about = "Batch visual question answering against a multimodal chat endpoint"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query every dataset record under one prompting mode and save the results.
    Run(RunArgs),
    /// Summarise the saved results of one mode for a given day.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub data_file: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Scaffold)]
    pub mode: Mode,

    /// Number of queries in flight at once; 1 runs sequentially in dataset order.
    #[arg(long, default_value_t = 1)]
    pub parallel: usize,

    #[arg(long, default_value = "examples")]
    pub suite: String,

    #[arg(long, default_value = "log")]
    pub log_root: PathBuf,

    #[arg(long, default_value = "gpt-4-vision-preview")]
    pub model: String,

    #[arg(long, default_value_t = 0.0)]
    pub temperature: f64,

    #[arg(long, default_value_t = 4096)]
    pub max_tokens: u32,

    #[arg(long, default_value_t = DEFAULT_GRID_ROWS)]
    pub grid_rows: u32,

    #[arg(long, default_value_t = DEFAULT_GRID_COLS)]
    pub grid_cols: u32,

    #[arg(long, value_enum, default_value_t = ImageDetail::High)]
    pub image_detail: ImageDetail,

    #[arg(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = DEFAULT_MIN_WAIT_SECS)]
    pub min_wait_secs: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_WAIT_SECS)]
    pub max_wait_secs: u64,

    #[arg(long, default_value_t = 300)]
    pub request_timeout_secs: u64,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "log")]
    pub log_root: PathBuf,

    /// Date partition (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long, default_value = "examples")]
    pub suite: String,

    #[arg(long, value_enum)]
    pub mode: Mode,
}
