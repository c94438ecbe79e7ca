use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::model::RetrievalResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPolicy {
    pub limit: Option<usize>,
    pub threshold: Option<f64>,
}

impl FilterPolicy {
    pub fn new(limit: Option<usize>, threshold: Option<f64>) -> Self {
        Self { limit, threshold }
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if let Some(threshold) = self.threshold
            && !threshold.is_finite()
        {
            return Err(EvalError::invalid(format!(
                "filter threshold must be finite, got {threshold}"
            )));
        }
        Ok(())
    }
}

pub fn filter_results(
    results: &[RetrievalResult],
    policy: &FilterPolicy,
) -> Result<Vec<RetrievalResult>, EvalError> {
    policy.validate()?;

    let filtered = results
        .iter()
        .map(|entry| {
            let limit = policy.limit.unwrap_or(usize::MAX);
            let search_results = entry
                .search_results
                .iter()
                .take(limit)
                .filter(|hit| policy.threshold.is_none_or(|threshold| hit.score > threshold))
                .cloned()
                .collect();

            RetrievalResult {
                id: entry.id.clone(),
                question: entry.question.clone(),
                question_idx: entry.question_idx,
                search_results,
            }
        })
        .collect();

    Ok(filtered)
}
