use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::model::RetrievalResult;

pub type RelevanceRow = Vec<bool>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingScores {
    pub hit_rate: f64,
    pub mrr: f64,
}

pub fn relevance_matrix(results: &[RetrievalResult]) -> Vec<RelevanceRow> {
    results
        .iter()
        .map(|entry| {
            entry
                .search_results
                .iter()
                .map(|hit| hit.id == entry.id)
                .collect()
        })
        .collect()
}

pub fn hit_rate(matrix: &[RelevanceRow]) -> Result<f64, EvalError> {
    if matrix.is_empty() {
        return Err(EvalError::DivisionByZero { metric: "hit_rate" });
    }

    let hits = matrix.iter().filter(|row| row.contains(&true)).count();
    Ok(hits as f64 / matrix.len() as f64)
}

pub fn mrr(matrix: &[RelevanceRow]) -> Result<f64, EvalError> {
    if matrix.is_empty() {
        return Err(EvalError::DivisionByZero { metric: "mrr" });
    }

    let total = matrix
        .iter()
        .filter_map(|row| row.iter().position(|relevant| *relevant))
        .map(|rank| 1.0 / (rank + 1) as f64)
        .sum::<f64>();
    Ok(total / matrix.len() as f64)
}

pub fn evaluate(matrix: &[RelevanceRow]) -> Result<RankingScores, EvalError> {
    Ok(RankingScores {
        hit_rate: hit_rate(matrix)?,
        mrr: mrr(matrix)?,
    })
}
