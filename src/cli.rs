use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::collab::qdrant::DEFAULT_COLLECTION;
use crate::eval::runner::{
    DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD,
};

pub const DEFAULT_DATA_DIR: &str = ".cache/lore-eval";

#[derive(Parser, Debug)]
#[command(
    name = "lore-eval",
    version,
    about = "Retrieval and answer-quality evaluation for the Middle-earth character index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate golden questions for every character record.
    Questions(QuestionsArgs),
    /// Run golden questions against the search index, resumably.
    Retrieve(RetrieveArgs),
    /// Score filter strategies over saved retrieval results.
    Sweep(SweepArgs),
    /// Answer retrieved questions and grade the answers with a judge model.
    Judge(JudgeArgs),
    /// Show the latest retrieval run and checkpoint state.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OpenAiArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, default_value = crate::collab::openai::DEFAULT_OPENAI_MODEL)]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct QuestionsArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub records_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long)]
    pub max_records: Option<usize>,

    #[command(flatten)]
    pub openai: OpenAiArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RetrieveArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub golden_questions_path: Option<PathBuf>,

    #[arg(long)]
    pub results_path: Option<PathBuf>,

    /// Split the golden set into batches of this many records.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Zero-based batch to run when --batch-size is set.
    #[arg(long, default_value_t = 0)]
    pub batch: usize,

    #[arg(long, default_value_t = DEFAULT_REQUESTS_PER_MINUTE)]
    pub requests_per_minute: u32,

    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub search_limit: usize,

    #[arg(long, default_value_t = DEFAULT_SEARCH_THRESHOLD)]
    pub search_threshold: f64,

    /// Continue from the last partial run for this golden set.
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Explicit resume index; requires the results file to hold that many entries.
    #[arg(long)]
    pub start_index: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub no_checkpoint: bool,

    #[arg(long, env = "QDRANT_URL")]
    pub qdrant_url: String,

    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    #[arg(long, env = "JINA_API_KEY", hide_env_values = true)]
    pub jina_api_key: String,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub results_path: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long = "limit", value_delimiter = ',')]
    pub limits: Vec<usize>,

    #[arg(long = "threshold", value_delimiter = ',')]
    pub thresholds: Vec<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum JudgeProvider {
    Openai,
    Anthropic,
}

impl JudgeProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct JudgeArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub results_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long, default_value_t = 0)]
    pub batch: usize,

    #[arg(long, value_enum, default_value_t = JudgeProvider::Openai)]
    pub judge_provider: JudgeProvider,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, default_value = crate::collab::anthropic::DEFAULT_ANTHROPIC_MODEL)]
    pub anthropic_model: String,

    /// Rebuild the summary from an existing judged-answers file.
    #[arg(long, default_value_t = false)]
    pub summarize_only: bool,

    #[command(flatten)]
    pub openai: OpenAiArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}
