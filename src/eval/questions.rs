use serde_json::{Map, Value};
use tracing::debug;

use crate::collab::Completion;
use crate::error::EvalError;
use crate::model::{CharacterRecord, GoldenQuestion};

pub const QUESTIONS_PER_RECORD: usize = 5;

const QUESTION_SYSTEM_PROMPT: &str = r#"You are an assistant that generates evaluation questions to test retrieval quality on character data.
You will receive a JSON object describing a fictional character, which may include fields such as name, race, gender, birth, death, spouse, realm, biography, and others.

Your task:
1. Read and understand the JSON payload carefully.
2. Generate exactly 5 diverse and specific questions that can be answered using the information in the payload.
3. Focus on factual, grounded details such as relationships, timeline, characteristics, or key events mentioned in the biography.
4. Avoid trivial or repetitive questions.
5. Do not include any reasoning, explanations, or text outside the JSON array.

Output valid JSON only (no code blocks, no extra text):
["Question 1", "Question 2", "Question 3", "Question 4", "Question 5"]

If a field is null or missing, do not ask about it. If there is limited information, create general but relevant questions based on available content."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

pub fn record_payload(record: &CharacterRecord) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), Value::String(record.id.clone()));
    for (key, value) in record.payload.present_fields() {
        object.insert(key.to_string(), Value::String(value.to_string()));
    }
    Value::Object(object)
}

pub fn question_prompt(record: &CharacterRecord) -> PromptPair {
    let payload = serde_json::to_string_pretty(&record_payload(record))
        .unwrap_or_else(|_| format!("{{\"id\": \"{}\"}}", record.id));

    PromptPair {
        system: QUESTION_SYSTEM_PROMPT.to_string(),
        user: format!("Payload:\n{payload}"),
    }
}

pub fn parse_questions(raw: &str) -> Result<Vec<String>, EvalError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|err| EvalError::malformed(format!("questions are not valid JSON: {err}")))?;

    let Value::Array(items) = value else {
        return Err(EvalError::malformed("questions must be a JSON array"));
    };
    if items.len() != QUESTIONS_PER_RECORD {
        return Err(EvalError::malformed(format!(
            "expected {QUESTIONS_PER_RECORD} questions, got {}",
            items.len()
        )));
    }

    items
        .into_iter()
        .map(|item| match item {
            Value::String(question) => Ok(question),
            other => Err(EvalError::malformed(format!(
                "question entries must be strings, got {other}"
            ))),
        })
        .collect()
}

pub struct QuestionGenerator<C> {
    completion: C,
}

impl<C: Completion> QuestionGenerator<C> {
    pub fn new(completion: C) -> Self {
        Self { completion }
    }

    pub fn generate(&self, record: &CharacterRecord) -> Result<GoldenQuestion, EvalError> {
        let prompt = question_prompt(record);
        let raw = self.completion.complete(&prompt.system, &prompt.user)?;
        debug!(record_id = %record.id, "received question completion");

        Ok(GoldenQuestion {
            id: record.id.clone(),
            questions: parse_questions(&raw)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::{QuestionGenerator, parse_questions, question_prompt, record_payload};
    use crate::collab::Completion;
    use crate::error::EvalError;
    use crate::model::{CharacterAttributes, CharacterRecord};

    struct CannedCompletion {
        reply: String,
        prompts: RefCell<Vec<(String, String)>>,
    }

    impl CannedCompletion {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl Completion for CannedCompletion {
        fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, EvalError> {
            self.prompts
                .borrow_mut()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            Ok(self.reply.clone())
        }
    }

    fn beren() -> CharacterRecord {
        CharacterRecord {
            id: "c-101".to_string(),
            payload: CharacterAttributes {
                name: Some("Beren".to_string()),
                race: Some("Men".to_string()),
                spouse: Some("Lúthien".to_string()),
                hair: Some(String::new()),
                ..CharacterAttributes::default()
            },
        }
    }

    #[test]
    fn payload_drops_empty_attributes() {
        let payload = record_payload(&beren());
        assert_eq!(payload["id"], "c-101");
        assert_eq!(payload["spouse"], "Lúthien");
        assert!(payload.get("hair").is_none());
        assert!(payload.get("death").is_none());
    }

    #[test]
    fn prompt_embeds_the_payload() {
        let prompt = question_prompt(&beren());
        assert!(prompt.user.starts_with("Payload:\n"));
        assert!(prompt.user.contains("\"name\": \"Beren\""));
        assert!(prompt.system.contains("exactly 5"));
    }

    #[test]
    fn generator_returns_golden_question_for_record() {
        let completion = CannedCompletion::new(r#"["a?", "b?", "c?", "d?", "e?"]"#);
        let generator = QuestionGenerator::new(&completion);
        let golden = generator.generate(&beren()).expect("questions should parse");

        assert_eq!(golden.id, "c-101");
        assert_eq!(golden.questions, vec!["a?", "b?", "c?", "d?", "e?"]);
        assert_eq!(completion.prompts.borrow().len(), 1);
    }

    #[test]
    fn wrong_question_count_is_malformed() {
        let error = parse_questions(r#"["only one?"]"#).expect_err("one question should fail");
        assert!(matches!(error, EvalError::MalformedModelOutput { .. }));
    }

    #[test]
    fn non_json_and_non_string_entries_are_malformed() {
        assert!(matches!(
            parse_questions("Here are your questions: ..."),
            Err(EvalError::MalformedModelOutput { .. })
        ));
        assert!(matches!(
            parse_questions(r#"["a", "b", "c", "d", 5]"#),
            Err(EvalError::MalformedModelOutput { .. })
        ));
        assert!(matches!(
            parse_questions(r#"{"questions": []}"#),
            Err(EvalError::MalformedModelOutput { .. })
        ));
    }

    #[test]
    fn code_fenced_output_is_not_repaired() {
        let fenced = "```json\n[\"a\", \"b\", \"c\", \"d\", \"e\"]\n```";
        assert!(parse_questions(fenced).is_err());
    }
}
