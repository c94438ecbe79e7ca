pub mod judge;
pub mod questions;
pub mod retrieve;
pub mod status;
pub mod sweep;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::cli::OpenAiArgs;
use crate::collab::OpenAiChat;
use crate::eval::batch;
use crate::model::RetrievalRunManifest;
use crate::util::read_json;

pub const RECORDS_FILE: &str = "records.json";
pub const GOLDEN_QUESTIONS_FILE: &str = "golden_questions.json";
pub const RESULTS_FILE: &str = "retrieval_search_results.json";
pub const CHECKPOINT_DB_FILE: &str = "retrieval_checkpoints.sqlite";
pub const STRATEGY_REPORT_FILE: &str = "strategy_report.json";

const RETRIEVAL_MANIFEST_PATTERN: &str = r"^retrieval_run_(\d{8}T\d{6}Z)\.json$";

pub(crate) fn manifest_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("manifests")
}

pub(crate) fn select_batch<T>(
    items: &[T],
    batch_size: Option<usize>,
    batch_index: usize,
) -> Result<&[T]> {
    let Some(batch_size) = batch_size else {
        return Ok(items);
    };

    let batches = batch(items, batch_size)?;
    batches.get(batch_index).copied().with_context(|| {
        format!(
            "batch {batch_index} is out of range ({} batches of {batch_size})",
            batches.len()
        )
    })
}

pub(crate) fn batch_suffix(batch_size: Option<usize>, batch_index: usize) -> String {
    match batch_size {
        Some(_) => format!("_batch_{batch_index}"),
        None => String::new(),
    }
}

pub(crate) fn suffixed_file_name(file_name: &str, suffix: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}{suffix}.{extension}"),
        None => format!("{file_name}{suffix}"),
    }
}

pub(crate) fn openai_chat(args: &OpenAiArgs) -> Result<OpenAiChat> {
    let api_key = args
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY is not set (pass --openai-api-key or export it)")?;

    let mut chat = OpenAiChat::new(api_key, args.openai_model.clone())?;
    if let Some(base_url) = &args.openai_base_url {
        chat = chat.with_base_url(base_url.clone());
    }
    Ok(chat)
}

pub(crate) fn latest_retrieval_manifest(
    manifest_dir: &Path,
    checkpoint_key: Option<&str>,
) -> Result<Option<(PathBuf, RetrievalRunManifest)>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let pattern = Regex::new(RETRIEVAL_MANIFEST_PATTERN)
        .context("failed to compile retrieval manifest pattern")?;

    let mut candidates = Vec::<(String, PathBuf)>::new();
    for entry in fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(captures) = pattern.captures(&file_name) {
            candidates.push((captures[1].to_string(), entry.path()));
        }
    }
    candidates.sort();

    for (_, path) in candidates.into_iter().rev() {
        let manifest: RetrievalRunManifest = match read_json(&path) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable run manifest");
                continue;
            }
        };
        if checkpoint_key.is_none_or(|key| manifest.checkpoint_key == key) {
            return Ok(Some((path, manifest)));
        }
    }

    Ok(None)
}

const FORCED_EXIT_CODE: i32 = 130;

pub(crate) fn install_interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    let listener_flag = Arc::clone(&flag);
    thread::Builder::new()
        .name("interrupt-listener".to_string())
        .spawn(move || {
            let forced = runtime.block_on(watch_interrupts(&listener_flag, tokio::signal::ctrl_c));
            if let Some(code) = forced {
                std::process::exit(code);
            }
        })
        .context("failed to spawn interrupt listener")?;

    Ok(flag)
}

// First signal raises the flag; a second one returns the forced exit code.
async fn watch_interrupts<S, F>(flag: &AtomicBool, mut next_signal: S) -> Option<i32>
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    next_signal().await.ok()?;
    warn!("interrupt received, stopping after the current pair (press Ctrl-C again to exit now)");
    flag.store(true, Ordering::SeqCst);

    next_signal().await.ok()?;
    warn!("second interrupt received, exiting without saving");
    Some(FORCED_EXIT_CODE)
}
