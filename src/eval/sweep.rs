use serde::{Deserialize, Serialize};
use tracing::debug;

use super::filter::{FilterPolicy, filter_results};
use super::metrics::{evaluate, relevance_matrix};
use crate::error::EvalError;
use crate::model::RetrievalResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub limit: Option<usize>,
    pub threshold: Option<f64>,
    pub hit_rate: f64,
    pub mrr: f64,
}

impl StrategyResult {
    pub fn policy(&self) -> FilterPolicy {
        FilterPolicy::new(self.limit, self.threshold)
    }

    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::HitRate => self.hit_rate,
            Metric::Mrr => self.mrr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    HitRate,
    Mrr,
}

/// Winner for one metric. The earliest strategy in enumeration order wins;
/// every later strategy with the same score is listed in `ties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestStrategy {
    pub result: StrategyResult,
    pub ties: Vec<FilterPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub report_version: u32,
    pub generated_at: String,
    pub result_count: usize,
    pub strategies: Vec<StrategyResult>,
    pub best_hit_rate: Option<BestStrategy>,
    pub best_mrr: Option<BestStrategy>,
}

pub fn sweep(
    results: &[RetrievalResult],
    strategies: &[FilterPolicy],
) -> Result<Vec<StrategyResult>, EvalError> {
    strategies
        .iter()
        .map(|policy| {
            let filtered = filter_results(results, policy)?;
            let matrix = relevance_matrix(&filtered);
            let scores = evaluate(&matrix)?;
            debug!(
                limit = ?policy.limit,
                threshold = ?policy.threshold,
                hit_rate = scores.hit_rate,
                mrr = scores.mrr,
                "strategy evaluated"
            );

            Ok(StrategyResult {
                limit: policy.limit,
                threshold: policy.threshold,
                hit_rate: scores.hit_rate,
                mrr: scores.mrr,
            })
        })
        .collect()
}

pub fn best_strategy(results: &[StrategyResult], metric: Metric) -> Option<BestStrategy> {
    let mut best_index: Option<usize> = None;
    for (index, candidate) in results.iter().enumerate() {
        if best_index.is_none_or(|current| candidate.score(metric) > results[current].score(metric))
        {
            best_index = Some(index);
        }
    }

    let best_index = best_index?;
    let winner = results[best_index];
    let ties = results
        .iter()
        .enumerate()
        .filter(|(index, candidate)| {
            *index != best_index && candidate.score(metric) == winner.score(metric)
        })
        .map(|(_, candidate)| candidate.policy())
        .collect();

    Some(BestStrategy {
        result: winner,
        ties,
    })
}
