use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use crate::cli::{JudgeArgs, JudgeProvider};
use crate::collab::{AnthropicChat, Completion};
use crate::commands::{RESULTS_FILE, batch_suffix, openai_chat, select_batch, suffixed_file_name};
use crate::eval::{JudgeSummary, JudgedAnswer, RagJudge, summarize};
use crate::model::RetrievalResult;
use crate::util::{now_utc_string, read_json, write_json_pretty};

const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Serialize)]
struct JudgeReport<'a> {
    generated_at: String,
    judged_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    results_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer_model: Option<&'a str>,
    judge_provider: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    judge_model: Option<&'a str>,
    summary: &'a JudgeSummary,
}

pub fn run(args: JudgeArgs) -> Result<()> {
    let results_path = args
        .results_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(RESULTS_FILE));
    let suffix = format!(
        "_{}{}",
        args.judge_provider.as_str(),
        batch_suffix(args.batch_size, args.batch)
    );
    let output_path = args.output_path.clone().unwrap_or_else(|| {
        args.data_dir
            .join(suffixed_file_name("evaluation_results.json", &suffix))
    });
    let summary_path = summary_path_for(&output_path);

    if args.summarize_only {
        let summary =
            summarize_judged_file(&output_path, &summary_path, args.judge_provider.as_str())?;
        log_summary(&summary, &output_path, &summary_path);
        return Ok(());
    }

    let results_all: Vec<RetrievalResult> = read_json(&results_path)?;
    let results = select_batch(&results_all, args.batch_size, args.batch)?;

    let answerer = openai_chat(&args.openai)?;
    let (judge, judge_model): (Box<dyn Completion>, String) = match args.judge_provider {
        JudgeProvider::Openai => {
            let chat = openai_chat(&args.openai)?;
            let model = chat.model().to_string();
            (Box::new(chat) as Box<dyn Completion>, model)
        }
        JudgeProvider::Anthropic => {
            let api_key = args
                .anthropic_api_key
                .clone()
                .context("ANTHROPIC_API_KEY is not set (pass --anthropic-api-key or export it)")?;
            let chat = AnthropicChat::new(api_key, args.anthropic_model.clone())?;
            let model = chat.model().to_string();
            (Box::new(chat) as Box<dyn Completion>, model)
        }
    };

    info!(
        path = %results_path.display(),
        entries = results.len(),
        answer_model = %answerer.model(),
        judge_provider = args.judge_provider.as_str(),
        judge_model = %judge_model,
        "judging retrieved answers"
    );

    let rag = RagJudge::new(&answerer, judge);
    let mut judged = Vec::<JudgedAnswer>::with_capacity(results.len());
    for (position, result) in results.iter().enumerate() {
        match rag.evaluate(result) {
            Ok(entry) => judged.push(entry),
            Err(err) => {
                write_json_pretty(&output_path, &judged)?;
                error!(
                    record_id = %result.id,
                    question_idx = result.question_idx,
                    saved = judged.len(),
                    path = %output_path.display(),
                    "judging stopped; saved answers judged so far"
                );
                return Err(err).with_context(|| {
                    format!(
                        "judging failed for record {} question {}",
                        result.id, result.question_idx
                    )
                });
            }
        }

        if (position + 1) % PROGRESS_EVERY == 0 {
            info!(processed = position + 1, total = results.len(), "judge progress");
        }
    }

    write_json_pretty(&output_path, &judged)?;
    let summary = summarize(&judged)?;

    let report = JudgeReport {
        generated_at: now_utc_string(),
        judged_path: output_path.display().to_string(),
        results_path: Some(results_path.display().to_string()),
        answer_model: Some(answerer.model()),
        judge_provider: args.judge_provider.as_str(),
        judge_model: Some(&judge_model),
        summary: &summary,
    };
    write_json_pretty(&summary_path, &report)?;
    log_summary(&summary, &output_path, &summary_path);

    Ok(())
}

fn summary_path_for(output_path: &Path) -> PathBuf {
    output_path.with_file_name(suffixed_file_name(
        &output_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "evaluation_results.json".to_string()),
        "_summary",
    ))
}

fn summarize_judged_file(
    judged_path: &Path,
    summary_path: &Path,
    judge_provider: &str,
) -> Result<JudgeSummary> {
    let judged: Vec<JudgedAnswer> = read_json(judged_path)?;
    info!(
        path = %judged_path.display(),
        entries = judged.len(),
        "summarizing judged answers"
    );
    let summary = summarize(&judged)
        .with_context(|| format!("cannot summarize {}", judged_path.display()))?;

    let report = JudgeReport {
        generated_at: now_utc_string(),
        judged_path: judged_path.display().to_string(),
        results_path: None,
        answer_model: None,
        judge_provider,
        judge_model: None,
        summary: &summary,
    };
    write_json_pretty(summary_path, &report)?;
    Ok(summary)
}

fn log_summary(summary: &JudgeSummary, output_path: &Path, summary_path: &Path) {
    info!(
        entries = summary.entries,
        avg_relevance = summary.avg_relevance,
        avg_groundedness = summary.avg_groundedness,
        avg_completeness = summary.avg_completeness,
        avg_faithfulness = summary.avg_faithfulness,
        total_avg_score = summary.total_avg_score,
        output_path = %output_path.display(),
        summary_path = %summary_path.display(),
        "judging completed"
    );
}

#[cfg(test)]
mod tests {
    use super::{summarize_judged_file, summary_path_for};
    use crate::eval::JudgedAnswer;
    use crate::eval::judge::JudgeVerdict;
    use crate::util::{read_json, write_json_pretty};

    fn judged(relevance: u8, groundedness: u8, completeness: u8, faithfulness: u8) -> JudgedAnswer {
        JudgedAnswer {
            question: "Who forged Narsil?".to_string(),
            answer: "Telchar of Nogrod.".to_string(),
            verdict: JudgeVerdict {
                relevance,
                groundedness,
                completeness,
                faithfulness,
                comments: String::new(),
            },
        }
    }

    #[test]
    fn summary_file_sits_next_to_the_judged_answers() {
        let path = std::path::Path::new("data/evaluation_results_openai_batch_2x1.json");
        assert_eq!(
            summary_path_for(path),
            std::path::Path::new("data/evaluation_results_openai_batch_2x1_summary.json")
        );
    }

    #[test]
    fn judged_file_is_summarized_without_model_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let judged_path = dir.path().join("evaluation_results_openai.json");
        let summary_path = summary_path_for(&judged_path);
        write_json_pretty(&judged_path, &vec![judged(3, 3, 2, 2), judged(1, 3, 0, 2)])
            .expect("write judged answers");

        let summary =
            summarize_judged_file(&judged_path, &summary_path, "openai").expect("summarize");
        assert_eq!(summary.entries, 2);
        assert!((summary.total_avg_score - 2.0).abs() < 1e-12);

        let report: serde_json::Value = read_json(&summary_path).expect("read report");
        assert_eq!(report["judge_provider"], "openai");
        assert_eq!(report["summary"]["entries"], 2);
        assert!((report["summary"]["avg_relevance"].as_f64().expect("number") - 2.0).abs() < 1e-12);
        assert!(report.get("answer_model").is_none());
        assert_eq!(
            report["judged_path"].as_str().expect("path"),
            judged_path.display().to_string()
        );
    }

    #[test]
    fn summarizing_an_empty_judged_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let judged_path = dir.path().join("evaluation_results_openai.json");
        write_json_pretty(&judged_path, &Vec::<JudgedAnswer>::new()).expect("write judged answers");

        let error = summarize_judged_file(&judged_path, &summary_path_for(&judged_path), "openai")
            .expect_err("empty file has no averages");
        assert!(error.to_string().contains("cannot summarize"));
    }
}
