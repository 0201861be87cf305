use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "rageval",
    version,
    about = "Run retrieval systems over query sets and compare them with an LLM judge"
)]
pub struct Cli {
    /// Directory containing `domains/<domain>/...` configuration.
    #[arg(long, global = true, default_value = ".")]
    pub config_root: PathBuf,

    /// Directory where runs and comparisons are stored.
    #[arg(long, global = true, default_value = ".rageval")]
    pub data_root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a query set against one system and store the run.
    Run(RunArgs),
    /// Judge two or more stored runs of the same domain.
    Compare(CompareArgs),
    /// List stored runs or comparisons.
    List(ListArgs),
    /// Print a stored run or comparison.
    Show(ShowArgs),
    /// Win/tie/loss summary of a stored comparison.
    Stats(StatsArgs),
    /// Build a local sqlite chunk index from JSONL.
    Index(IndexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub domain: String,

    #[arg(long)]
    pub system: String,

    #[arg(long)]
    pub query_set: String,

    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Overrides the system's configured `top_k`.
    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(long)]
    pub domain: String,

    #[arg(required = true, num_args = 2..)]
    pub run_ids: Vec<String>,

    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, default_value_t = 1000)]
    pub retry_base_ms: u64,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ListTarget {
    Runs,
    Comparisons,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(value_enum)]
    pub target: ListTarget,

    #[arg(long)]
    pub domain: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Run or comparison id, or a unique prefix of one.
    pub id: String,

    /// Recompute the run's snapshot checksum.
    #[arg(long, default_value_t = false)]
    pub verify: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    pub comparison_id: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long)]
    pub db: PathBuf,

    /// JSONL file with one `{"id", "content", "metadata"}` object per line.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub embedding_dim: Option<usize>,
}
