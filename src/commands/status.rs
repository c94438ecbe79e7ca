use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{
    CHECKPOINT_DB_FILE, GOLDEN_QUESTIONS_FILE, STRATEGY_REPORT_FILE, latest_retrieval_manifest,
    manifest_dir,
};
use crate::eval::SweepReport;
use crate::model::GoldenQuestion;
use crate::store::CheckpointStore;
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = manifest_dir(&args.data_dir);
    let golden_path = args.data_dir.join(GOLDEN_QUESTIONS_FILE);
    let report_path = args.data_dir.join(STRATEGY_REPORT_FILE);

    info!(data_dir = %args.data_dir.display(), "status requested");

    if golden_path.exists() {
        let golden: Vec<GoldenQuestion> = read_json(&golden_path)?;
        info!(
            path = %golden_path.display(),
            records = golden.len(),
            questions = golden.iter().map(|entry| entry.questions.len()).sum::<usize>(),
            "golden questions"
        );
    } else {
        warn!(path = %golden_path.display(), "golden questions missing");
    }

    match latest_retrieval_manifest(&manifest_dir, None)? {
        Some((path, manifest)) => {
            info!(
                path = %path.display(),
                run_id = %manifest.run_id,
                status = %manifest.status,
                checkpoint_key = %manifest.checkpoint_key,
                updated_at = %manifest.updated_at,
                total_pairs = manifest.total_pairs,
                resume_index = manifest.resume_index,
                salvaged_results = manifest.salvaged_results,
                failure_kind = %manifest.failure_kind.clone().unwrap_or_default(),
                failure_reason = %manifest.failure_reason.clone().unwrap_or_default(),
                failed_record = %manifest.failed_pair.as_ref().map(|pair| pair.record_id.clone()).unwrap_or_default(),
                warnings = manifest.warnings.len(),
                "latest retrieval run"
            );

            let db_path = manifest
                .paths
                .checkpoint_db_path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| args.data_dir.join(CHECKPOINT_DB_FILE));
            if db_path.exists() {
                let store = CheckpointStore::open(&db_path, manifest.checkpoint_key.clone())?;
                info!(
                    path = %db_path.display(),
                    checkpointed_pairs = store.count()?,
                    checkpoint_resume_index = store.load()?.last().map(|(index, _)| index + 1).unwrap_or(0),
                    "checkpoint status"
                );
            } else {
                warn!(path = %db_path.display(), "checkpoint database missing");
            }
        }
        None => warn!(path = %manifest_dir.display(), "no retrieval run manifests"),
    }

    if report_path.exists() {
        let report: SweepReport = read_json(&report_path)?;
        if let Some(best) = &report.best_hit_rate {
            info!(
                limit = ?best.result.limit,
                threshold = ?best.result.threshold,
                hit_rate = best.result.hit_rate,
                ties = best.ties.len(),
                "best hit-rate strategy"
            );
        }
        if let Some(best) = &report.best_mrr {
            info!(
                limit = ?best.result.limit,
                threshold = ?best.result.threshold,
                mrr = best.result.mrr,
                ties = best.ties.len(),
                "best mrr strategy"
            );
        }
    } else {
        warn!(path = %report_path.display(), "strategy report missing");
    }

    Ok(())
}
