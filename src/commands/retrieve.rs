use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::RetrieveArgs;
use crate::collab::{JinaEmbedder, QdrantSearch};
use crate::commands::{
    CHECKPOINT_DB_FILE, GOLDEN_QUESTIONS_FILE, RESULTS_FILE, batch_suffix, install_interrupt_flag,
    latest_retrieval_manifest, manifest_dir, select_batch, suffixed_file_name,
};
use crate::eval::{RetrievalOutcome, RetrievalRunner, RunnerConfig, pair_indices, total_pairs};
use crate::model::{GoldenQuestion, RetrievalResult, RetrievalRunManifest, RetrievalRunPaths};
use crate::store::CheckpointStore;
use crate::util::{
    ensure_directory, now_utc_string, read_json, sha256_file, utc_compact_string,
    write_json_pretty,
};

const MANIFEST_VERSION: u32 = 1;

pub fn run(args: RetrieveArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("retrieve-{}", utc_compact_string(started_ts));

    let manifest_dir = manifest_dir(&args.data_dir);
    ensure_directory(&manifest_dir)?;
    let manifest_path = manifest_dir.join(format!(
        "retrieval_run_{}.json",
        utc_compact_string(started_ts)
    ));

    let suffix = batch_suffix(args.batch_size, args.batch);
    let golden_path = args
        .golden_questions_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(GOLDEN_QUESTIONS_FILE));
    let results_path = args
        .results_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(suffixed_file_name(RESULTS_FILE, &suffix)));
    let checkpoint_db_path = (!args.no_checkpoint).then(|| args.data_dir.join(CHECKPOINT_DB_FILE));

    let golden_all: Vec<GoldenQuestion> = read_json(&golden_path)?;
    let golden_questions_sha256 = sha256_file(&golden_path)?;
    let golden = select_batch(&golden_all, args.batch_size, args.batch)?;
    let checkpoint_key = checkpoint_key(&golden_questions_sha256, args.batch_size, args.batch);
    let total = total_pairs(golden);

    let config = RunnerConfig {
        requests_per_minute: args.requests_per_minute,
        search_limit: args.search_limit,
        search_threshold: args.search_threshold,
    };
    config.delay()?;

    let mut store = match &checkpoint_db_path {
        Some(db_path) => Some(CheckpointStore::open(db_path, checkpoint_key.clone())?),
        None => None,
    };

    let plan = plan_resume(
        ResumeRequest {
            resume: args.resume,
            start_index: args.start_index,
        },
        golden,
        &config,
        &results_path,
        &manifest_dir,
        &checkpoint_key,
        store.as_ref(),
    )?;
    let mut warnings = plan.warnings.clone();
    if args.no_checkpoint {
        warnings.push("checkpointing disabled; a crash loses unsaved pairs".to_string());
    }
    for warning in &warnings {
        warn!(warning = %warning, "retrieval run warning");
    }

    if let Some(store) = store.as_mut() {
        let previous_indices = pair_indices(golden, &plan.previous)?;
        store.reset(previous_indices.into_iter().zip(plan.previous.iter()))?;
    }

    info!(
        run_id = %run_id,
        checkpoint_key = %checkpoint_key,
        golden_records = golden.len(),
        total_pairs = total,
        start_index = plan.start_index,
        resume_source = plan.source,
        collection = %args.collection,
        "starting retrieval"
    );

    let interrupt = install_interrupt_flag()?;
    let embedder = JinaEmbedder::new(args.jina_api_key.clone())?;
    let search = QdrantSearch::new(
        args.qdrant_url.clone(),
        args.qdrant_api_key.clone(),
        args.collection.clone(),
        embedder,
    )?;

    let start_index = plan.start_index;
    let outcome = {
        let mut runner = RetrievalRunner::new(&search, config).with_interrupt(&interrupt);
        if let Some(store) = store.as_mut() {
            runner = runner.with_sink(store);
        }
        runner.run(golden, plan.previous, start_index)?
    };

    write_json_pretty(&results_path, &outcome.results())?;

    let mut manifest = RetrievalRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.clone(),
        checkpoint_key: checkpoint_key.clone(),
        status: if outcome.is_complete() {
            "completed"
        } else {
            "partial"
        }
        .to_string(),
        started_at,
        updated_at: now_utc_string(),
        requests_per_minute: config.requests_per_minute,
        search_limit: config.search_limit,
        search_threshold: config.search_threshold,
        batch_size: args.batch_size,
        batch_index: args.batch_size.map(|_| args.batch),
        total_pairs: total,
        start_index,
        resume_index: total,
        salvaged_results: outcome.results().len(),
        failed_pair: None,
        failure_kind: None,
        failure_reason: None,
        golden_questions_sha256,
        paths: RetrievalRunPaths {
            golden_questions_path: golden_path.display().to_string(),
            results_path: results_path.display().to_string(),
            checkpoint_db_path: checkpoint_db_path
                .as_ref()
                .map(|path| path.display().to_string()),
        },
        warnings,
    };

    if let RetrievalOutcome::Partial {
        resume_index,
        failed_pair,
        reason,
        ..
    } = &outcome
    {
        manifest.resume_index = *resume_index;
        manifest.failed_pair = Some(failed_pair.clone());
        manifest.failure_kind = Some(reason.kind().to_string());
        manifest.failure_reason = Some(reason.to_string());
    }

    write_json_pretty(&manifest_path, &manifest)?;

    match outcome {
        RetrievalOutcome::Completed(results) => {
            if let Some(store) = store.as_ref() {
                let removed = store.clear()?;
                info!(removed, "cleared retrieval checkpoints");
            }
            info!(
                run_id = %run_id,
                results = results.len(),
                results_path = %results_path.display(),
                manifest_path = %manifest_path.display(),
                "retrieval completed"
            );
            Ok(())
        }
        RetrievalOutcome::Partial {
            results,
            resume_index,
            reason,
            ..
        } => {
            bail!(
                "retrieval stopped at pair {resume_index} of {total} ({}); {} results saved to {}, rerun with --resume (manifest {})",
                reason.kind(),
                results.len(),
                results_path.display(),
                manifest_path.display()
            )
        }
    }
}

fn checkpoint_key(golden_sha256: &str, batch_size: Option<usize>, batch_index: usize) -> String {
    let digest = golden_sha256.get(..16).unwrap_or(golden_sha256);
    match batch_size {
        Some(size) => format!("golden-{digest}-batch-{size}x{batch_index}"),
        None => format!("golden-{digest}"),
    }
}

#[derive(Debug, Clone, Copy)]
struct ResumeRequest {
    resume: bool,
    start_index: Option<usize>,
}

#[derive(Debug)]
struct ResumePlan {
    previous: Vec<RetrievalResult>,
    start_index: usize,
    source: &'static str,
    warnings: Vec<String>,
}

impl ResumePlan {
    fn fresh(warnings: Vec<String>) -> Self {
        Self {
            previous: Vec::new(),
            start_index: 0,
            source: "fresh",
            warnings,
        }
    }
}

fn plan_resume(
    request: ResumeRequest,
    golden: &[GoldenQuestion],
    config: &RunnerConfig,
    results_path: &Path,
    manifest_dir: &Path,
    checkpoint_key: &str,
    store: Option<&CheckpointStore>,
) -> Result<ResumePlan> {
    let mut warnings = Vec::<String>::new();

    if let Some(start_index) = request.start_index {
        let mut previous = if results_path.exists() {
            read_json::<Vec<RetrievalResult>>(results_path)?
        } else {
            Vec::new()
        };
        let keep = pair_indices(golden, &previous)?
            .into_iter()
            .take_while(|pair_index| *pair_index < start_index)
            .count();
        if previous.len() > keep {
            warnings.push(format!(
                "discarding {} saved results at or past index {start_index}",
                previous.len() - keep
            ));
            previous.truncate(keep);
        }
        if keep < start_index {
            warnings.push(format!(
                "skipping {} pairs below index {start_index} that have no saved result",
                start_index - keep
            ));
        }
        return Ok(ResumePlan {
            previous,
            start_index,
            source: "explicit",
            warnings,
        });
    }

    if !request.resume {
        return Ok(ResumePlan::fresh(warnings));
    }

    let mut plan = ResumePlan::fresh(Vec::new());

    if let Some((path, manifest)) = latest_retrieval_manifest(manifest_dir, Some(checkpoint_key))? {
        if manifest.status == "completed" {
            bail!(
                "run {} already completed this golden set ({}); rerun without --resume",
                manifest.run_id,
                path.display()
            );
        }
        if manifest.search_limit != config.search_limit
            || manifest.search_threshold != config.search_threshold
        {
            warnings.push(format!(
                "resuming run {} with different search settings (limit {} -> {}, threshold {} -> {})",
                manifest.run_id,
                manifest.search_limit,
                config.search_limit,
                manifest.search_threshold,
                config.search_threshold
            ));
        }

        let saved_path = PathBuf::from(&manifest.paths.results_path);
        if saved_path.exists() {
            let mut previous: Vec<RetrievalResult> = read_json(&saved_path)?;
            if previous.len() >= manifest.salvaged_results {
                previous.truncate(manifest.salvaged_results);
                plan.start_index = manifest.resume_index;
                plan.previous = previous;
                plan.source = "manifest";
            } else {
                warnings.push(format!(
                    "{} holds {} results but run {} saved {}",
                    saved_path.display(),
                    previous.len(),
                    manifest.run_id,
                    manifest.salvaged_results
                ));
            }
        } else {
            warnings.push(format!(
                "results file {} from run {} is missing",
                saved_path.display(),
                manifest.run_id
            ));
        }
    }

    if let Some(store) = store {
        let checkpointed = store.load()?;
        let resume_index = checkpointed
            .last()
            .map_or(0, |(pair_index, _)| pair_index + 1);
        if resume_index > plan.start_index {
            plan.start_index = resume_index;
            plan.previous = checkpointed.into_iter().map(|(_, result)| result).collect();
            plan.source = "checkpoint";
        }
    }

    if plan.start_index == 0 {
        warnings.push("nothing to resume; starting from the first pair".to_string());
    }
    plan.warnings = warnings;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ResumeRequest, checkpoint_key, plan_resume};
    use crate::eval::RunnerConfig;
    use crate::model::{
        GoldenQuestion, RetrievalResult, RetrievalRunManifest, RetrievalRunPaths, SearchHit,
    };
    use crate::store::CheckpointStore;
    use crate::util::write_json_pretty;

    const KEY: &str = "golden-0123456789abcdef";

    fn result(pair: usize) -> RetrievalResult {
        RetrievalResult {
            id: format!("R{}", pair / 5),
            question: format!("question {pair}"),
            question_idx: pair % 5,
            search_results: vec![SearchHit {
                id: format!("R{}", pair / 5),
                score: 0.8,
                attributes: Default::default(),
            }],
        }
    }

    fn results(count: usize) -> Vec<RetrievalResult> {
        (0..count).map(result).collect()
    }

    fn golden() -> Vec<GoldenQuestion> {
        (0..2)
            .map(|record| GoldenQuestion {
                id: format!("R{record}"),
                questions: (0..5).map(|n| format!("question {}", record * 5 + n)).collect(),
            })
            .collect()
    }

    fn partial_manifest(results_path: &Path, resume_index: usize) -> RetrievalRunManifest {
        RetrievalRunManifest {
            manifest_version: 1,
            run_id: "retrieve-20260101T000000Z".to_string(),
            checkpoint_key: KEY.to_string(),
            status: "partial".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:01:00Z".to_string(),
            requests_per_minute: 400,
            search_limit: 5,
            search_threshold: 0.3,
            batch_size: None,
            batch_index: None,
            total_pairs: 10,
            start_index: 0,
            resume_index,
            salvaged_results: resume_index,
            failed_pair: None,
            failure_kind: Some("collaborator_failure".to_string()),
            failure_reason: Some("qdrant call failed: HTTP 503".to_string()),
            golden_questions_sha256: "0123456789abcdef".to_string(),
            paths: RetrievalRunPaths {
                golden_questions_path: "golden_questions.json".to_string(),
                results_path: results_path.display().to_string(),
                checkpoint_db_path: None,
            },
            warnings: Vec::new(),
        }
    }

    fn request(resume: bool, start_index: Option<usize>) -> ResumeRequest {
        ResumeRequest {
            resume,
            start_index,
        }
    }

    #[test]
    fn checkpoint_key_includes_batch_coordinates() {
        let digest = "0123456789abcdef0123456789abcdef";
        assert_eq!(checkpoint_key(digest, None, 0), KEY);
        assert_eq!(
            checkpoint_key(digest, Some(50), 2),
            "golden-0123456789abcdef-batch-50x2"
        );
    }

    #[test]
    fn fresh_run_ignores_saved_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(4)).expect("write results");

        let plan = plan_resume(
            request(false, None),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &dir.path().join("manifests"),
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 0);
        assert!(plan.previous.is_empty());
        assert_eq!(plan.source, "fresh");
    }

    #[test]
    fn resume_uses_the_partial_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifests = dir.path().join("manifests");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(7)).expect("write results");
        write_json_pretty(
            &manifests.join("retrieval_run_20260101T000000Z.json"),
            &partial_manifest(&results_path, 7),
        )
        .expect("write manifest");

        let plan = plan_resume(
            request(true, None),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &manifests,
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 7);
        assert_eq!(plan.previous, results(7));
        assert_eq!(plan.source, "manifest");
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn resume_prefers_a_longer_checkpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifests = dir.path().join("manifests");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(3)).expect("write results");
        write_json_pretty(
            &manifests.join("retrieval_run_20260101T000000Z.json"),
            &partial_manifest(&results_path, 3),
        )
        .expect("write manifest");

        let mut store =
            CheckpointStore::open(&dir.path().join("checkpoints.sqlite"), KEY).expect("store");
        store
            .reset(results(6).iter().enumerate())
            .expect("seed checkpoints");

        let plan = plan_resume(
            request(true, None),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &manifests,
            KEY,
            Some(&store),
        )
        .expect("plan");
        assert_eq!(plan.start_index, 6);
        assert_eq!(plan.source, "checkpoint");
    }

    #[test]
    fn resuming_a_completed_run_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifests = dir.path().join("manifests");
        let results_path = dir.path().join("results.json");
        let mut manifest = partial_manifest(&results_path, 10);
        manifest.status = "completed".to_string();
        write_json_pretty(&manifests.join("retrieval_run_20260101T000000Z.json"), &manifest)
            .expect("write manifest");

        let error = plan_resume(
            request(true, None),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &manifests,
            KEY,
            None,
        )
        .expect_err("completed run cannot resume");
        assert!(error.to_string().contains("already completed"));
    }

    #[test]
    fn resume_warns_when_search_settings_changed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifests = dir.path().join("manifests");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(2)).expect("write results");
        write_json_pretty(
            &manifests.join("retrieval_run_20260101T000000Z.json"),
            &partial_manifest(&results_path, 2),
        )
        .expect("write manifest");

        let config = RunnerConfig {
            search_limit: 3,
            ..RunnerConfig::default()
        };
        let plan = plan_resume(
            request(true, None),
            &golden(),
            &config,
            &results_path,
            &manifests,
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 2);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("limit 5 -> 3"));
    }

    #[test]
    fn explicit_start_index_truncates_saved_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(9)).expect("write results");

        let plan = plan_resume(
            request(true, Some(7)),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &dir.path().join("manifests"),
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 7);
        assert_eq!(plan.previous, results(7));
        assert_eq!(plan.source, "explicit");
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn resume_with_nothing_saved_starts_over() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = plan_resume(
            request(true, None),
            &golden(),
            &RunnerConfig::default(),
            &dir.path().join("results.json"),
            &dir.path().join("manifests"),
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 0);
        assert!(plan.warnings[0].contains("nothing to resume"));
    }

    #[test]
    fn explicit_start_index_can_skip_pairs_without_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(3)).expect("write results");

        let plan = plan_resume(
            request(true, Some(4)),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &dir.path().join("manifests"),
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 4);
        assert_eq!(plan.previous, results(3));
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("skipping 1 pairs"));
    }

    #[test]
    fn resume_past_a_skipped_pair_keeps_saved_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifests = dir.path().join("manifests");
        let results_path = dir.path().join("results.json");
        write_json_pretty(&results_path, &results(3)).expect("write results");
        let mut manifest = partial_manifest(&results_path, 4);
        manifest.salvaged_results = 3;
        write_json_pretty(&manifests.join("retrieval_run_20260101T000000Z.json"), &manifest)
            .expect("write manifest");

        let plan = plan_resume(
            request(true, None),
            &golden(),
            &RunnerConfig::default(),
            &results_path,
            &manifests,
            KEY,
            None,
        )
        .expect("plan");
        assert_eq!(plan.start_index, 4);
        assert_eq!(plan.previous, results(3));
        assert_eq!(plan.source, "manifest");
    }

    #[test]
    fn checkpoint_resume_index_follows_the_last_saved_pair() {
        let dir = tempfile::tempdir().expect("tempdir");
        let saved = results(3);
        let later = result(5);
        let mut store =
            CheckpointStore::open(&dir.path().join("checkpoints.sqlite"), KEY).expect("store");
        store
            .reset(saved.iter().enumerate().chain(std::iter::once((5, &later))))
            .expect("seed checkpoints");

        let plan = plan_resume(
            request(true, None),
            &golden(),
            &RunnerConfig::default(),
            &dir.path().join("results.json"),
            &dir.path().join("manifests"),
            KEY,
            Some(&store),
        )
        .expect("plan");
        assert_eq!(plan.start_index, 6);
        assert_eq!(plan.previous.len(), 4);
        assert_eq!(plan.source, "checkpoint");
    }
}
