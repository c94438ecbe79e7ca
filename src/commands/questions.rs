use anyhow::{Context, Result};
use tracing::info;

use crate::cli::QuestionsArgs;
use crate::commands::{GOLDEN_QUESTIONS_FILE, RECORDS_FILE, openai_chat};
use crate::eval::QuestionGenerator;
use crate::model::{CharacterRecord, GoldenQuestion};
use crate::util::{read_json, write_json_pretty};

const PROGRESS_EVERY: usize = 10;

pub fn run(args: QuestionsArgs) -> Result<()> {
    let records_path = args
        .records_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(RECORDS_FILE));
    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| args.data_dir.join(GOLDEN_QUESTIONS_FILE));

    let mut records: Vec<CharacterRecord> = read_json(&records_path)?;
    if let Some(max_records) = args.max_records {
        records.truncate(max_records);
    }

    let chat = openai_chat(&args.openai)?;
    info!(
        records = records.len(),
        model = %chat.model(),
        path = %records_path.display(),
        "generating golden questions"
    );

    let generator = QuestionGenerator::new(&chat);
    let mut golden = Vec::<GoldenQuestion>::with_capacity(records.len());
    for (position, record) in records.iter().enumerate() {
        let entry = generator
            .generate(record)
            .with_context(|| format!("question generation failed for record {}", record.id))?;
        golden.push(entry);

        if (position + 1) % PROGRESS_EVERY == 0 {
            info!(processed = position + 1, total = records.len(), "question progress");
        }
    }

    write_json_pretty(&output_path, &golden)?;
    info!(
        path = %output_path.display(),
        records = golden.len(),
        questions = golden.iter().map(|entry| entry.questions.len()).sum::<usize>(),
        "wrote golden questions"
    );

    Ok(())
}
