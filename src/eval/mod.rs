pub mod batch;
pub mod filter;
pub mod judge;
pub mod metrics;
pub mod questions;
pub mod runner;
pub mod strategy;
pub mod sweep;

pub use self::batch::batch;
pub use self::judge::{JudgeSummary, JudgedAnswer, RagJudge, summarize};
pub use self::questions::QuestionGenerator;
pub use self::runner::{
    ResultSink, RetrievalOutcome, RetrievalRunner, RunnerConfig, pair_indices, total_pairs,
};
pub use self::strategy::strategies;
pub use self::sweep::{Metric, SweepReport, best_strategy, sweep};
