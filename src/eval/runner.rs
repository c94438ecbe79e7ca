use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::collab::SearchIndex;
use crate::error::EvalError;
use crate::model::{FailedPair, GoldenQuestion, RetrievalResult};

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 400;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_SEARCH_THRESHOLD: f64 = 0.3;
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    pub requests_per_minute: u32,
    pub search_limit: usize,
    pub search_threshold: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            search_limit: DEFAULT_SEARCH_LIMIT,
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
        }
    }
}

impl RunnerConfig {
    pub fn delay(&self) -> Result<Duration, EvalError> {
        if self.requests_per_minute == 0 {
            return Err(EvalError::invalid("requests per minute must be positive"));
        }
        Ok(Duration::from_secs_f64(
            60.0 / f64::from(self.requests_per_minute),
        ))
    }
}

pub trait ResultSink {
    fn record(&mut self, pair_index: usize, result: &RetrievalResult) -> Result<(), EvalError>;
}

#[derive(Debug)]
pub enum RetrievalOutcome {
    Completed(Vec<RetrievalResult>),
    Partial {
        results: Vec<RetrievalResult>,
        resume_index: usize,
        failed_pair: FailedPair,
        reason: EvalError,
    },
}

impl RetrievalOutcome {
    pub fn results(&self) -> &[RetrievalResult] {
        match self {
            Self::Completed(results) | Self::Partial { results, .. } => results,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

pub fn total_pairs(golden: &[GoldenQuestion]) -> usize {
    golden.iter().map(|entry| entry.questions.len()).sum()
}

pub fn pair_indices(
    golden: &[GoldenQuestion],
    results: &[RetrievalResult],
) -> Result<Vec<usize>, EvalError> {
    let mut pairs = golden
        .iter()
        .flat_map(|entry| {
            (0..entry.questions.len()).map(move |question_idx| (entry.id.as_str(), question_idx))
        })
        .enumerate();

    results
        .iter()
        .map(|result| {
            pairs
                .find(|(_, (id, question_idx))| {
                    *id == result.id && *question_idx == result.question_idx
                })
                .map(|(index, _)| index)
                .ok_or_else(|| {
                    EvalError::invalid(format!(
                        "result for record {} question {} is not in the golden set or is out of order",
                        result.id, result.question_idx
                    ))
                })
        })
        .collect()
}

pub struct RetrievalRunner<'a, S> {
    index: S,
    config: RunnerConfig,
    interrupt: Option<&'a AtomicBool>,
    sink: Option<&'a mut dyn ResultSink>,
}

impl<'a, S: SearchIndex> RetrievalRunner<'a, S> {
    pub fn new(index: S, config: RunnerConfig) -> Self {
        Self {
            index,
            config,
            interrupt: None,
            sink: None,
        }
    }

    pub fn with_interrupt(mut self, interrupt: &'a AtomicBool) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn with_sink(mut self, sink: &'a mut dyn ResultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Pairs are enumerated record by record, questions in order. Pairs below
    /// `start_index` are never searched; `previous` holds the results saved for
    /// them, in enumeration order, and may omit pairs that were skipped. Search
    /// failures and interrupts end the run as [`RetrievalOutcome::Partial`];
    /// `Err` is reserved for bad arguments.
    pub fn run(
        &mut self,
        golden: &[GoldenQuestion],
        previous: Vec<RetrievalResult>,
        start_index: usize,
    ) -> Result<RetrievalOutcome, EvalError> {
        let delay = self.config.delay()?;
        let total = total_pairs(golden);

        if start_index > total {
            return Err(EvalError::invalid(format!(
                "start index {start_index} is beyond the {total} available pairs"
            )));
        }
        let previous_indices = pair_indices(golden, &previous)?;
        if let Some(&last) = previous_indices.last()
            && last >= start_index
        {
            return Err(EvalError::invalid(format!(
                "previous results reach pair {last}, at or past start index {start_index}"
            )));
        }

        info!(
            total_pairs = total,
            start_index,
            skipped = start_index - previous.len(),
            "starting retrieval run"
        );

        let mut results = previous;
        let mut index = 0usize;

        for entry in golden {
            for (question_idx, question) in entry.questions.iter().enumerate() {
                if index < start_index {
                    if previous_indices.binary_search(&index).is_err() {
                        warn!(
                            pair_index = index,
                            record_id = %entry.id,
                            question_idx,
                            question = %question,
                            "skipping pair without a saved result"
                        );
                    }
                    index += 1;
                    continue;
                }

                let pair = || FailedPair {
                    record_id: entry.id.clone(),
                    question_idx,
                    question: question.clone(),
                };

                if self
                    .interrupt
                    .is_some_and(|flag| flag.load(Ordering::SeqCst))
                {
                    return Ok(stop(results, index, pair(), EvalError::UserInterrupt));
                }

                let hits = match self.index.search(
                    question,
                    self.config.search_limit,
                    self.config.search_threshold,
                ) {
                    Ok(hits) if hits.is_empty() => {
                        let reason = EvalError::collaborator("search", "search returned no hits");
                        return Ok(stop(results, index, pair(), reason));
                    }
                    Ok(hits) => hits,
                    Err(reason) => return Ok(stop(results, index, pair(), reason)),
                };

                let result = RetrievalResult {
                    id: entry.id.clone(),
                    question: question.clone(),
                    question_idx,
                    search_results: hits,
                };

                if let Some(sink) = self.sink.as_mut()
                    && let Err(reason) = sink.record(index, &result)
                {
                    return Ok(stop(results, index, pair(), reason));
                }

                results.push(result);
                index += 1;

                if index % PROGRESS_EVERY == 0 {
                    info!(processed = index, total_pairs = total, "retrieval progress");
                }

                thread::sleep(delay);
            }
        }

        info!(
            processed = index,
            results = results.len(),
            "retrieval run completed"
        );
        Ok(RetrievalOutcome::Completed(results))
    }
}

fn stop(
    results: Vec<RetrievalResult>,
    resume_index: usize,
    failed_pair: FailedPair,
    reason: EvalError,
) -> RetrievalOutcome {
    warn!(
        resume_index,
        salvaged = results.len(),
        record_id = %failed_pair.record_id,
        question_idx = failed_pair.question_idx,
        question = %failed_pair.question,
        reason = %reason,
        "retrieval run stopped"
    );

    RetrievalOutcome::Partial {
        results,
        resume_index,
        failed_pair,
        reason,
    }
}
