use anyhow::{Result, bail};
use tracing::info;

use crate::cli::SweepArgs;
use crate::commands::{RESULTS_FILE, STRATEGY_REPORT_FILE};
use crate::eval::strategy::{DEFAULT_LIMITS, DEFAULT_THRESHOLDS, default_strategies};
use crate::eval::sweep::BestStrategy;
use crate::eval::{Metric, SweepReport, best_strategy, strategies, sweep};
use crate::model::RetrievalResult;
use crate::util::{now_utc_string, read_json, write_json_pretty};

const REPORT_VERSION: u32 = 1;

pub fn run(args: SweepArgs) -> Result<()> {
    let results_path = args
        .results_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(RESULTS_FILE));
    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(STRATEGY_REPORT_FILE));

    let candidates = if args.limits.is_empty() && args.thresholds.is_empty() {
        default_strategies()
    } else {
        let limits = if args.limits.is_empty() {
            &DEFAULT_LIMITS[..]
        } else {
            &args.limits[..]
        };
        let thresholds = if args.thresholds.is_empty() {
            &DEFAULT_THRESHOLDS[..]
        } else {
            &args.thresholds[..]
        };
        strategies(limits, thresholds)
    };
    if candidates.is_empty() {
        bail!("no strategies to evaluate");
    }

    let results: Vec<RetrievalResult> = read_json(&results_path)?;
    info!(
        path = %results_path.display(),
        results = results.len(),
        strategies = candidates.len(),
        "sweeping filter strategies"
    );

    let scored = sweep(&results, &candidates)?;
    for entry in &scored {
        info!(
            limit = ?entry.limit,
            threshold = ?entry.threshold,
            hit_rate = entry.hit_rate,
            mrr = entry.mrr,
            "strategy score"
        );
    }

    let report = SweepReport {
        report_version: REPORT_VERSION,
        generated_at: now_utc_string(),
        result_count: results.len(),
        best_hit_rate: best_strategy(&scored, Metric::HitRate),
        best_mrr: best_strategy(&scored, Metric::Mrr),
        strategies: scored,
    };

    log_best("hit_rate", report.best_hit_rate.as_ref());
    log_best("mrr", report.best_mrr.as_ref());

    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), "wrote strategy report");

    Ok(())
}

fn log_best(metric: &str, best: Option<&BestStrategy>) {
    let Some(best) = best else {
        return;
    };

    let ties = best
        .ties
        .iter()
        .map(|policy| format!("limit={:?} threshold={:?}", policy.limit, policy.threshold))
        .collect::<Vec<String>>();

    info!(
        metric,
        limit = ?best.result.limit,
        threshold = ?best.result.threshold,
        hit_rate = best.result.hit_rate,
        mrr = best.result.mrr,
        ties = %ties.join(", "),
        "best strategy"
    );
}
