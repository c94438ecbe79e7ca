use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::questions::PromptPair;
use crate::collab::Completion;
use crate::error::EvalError;
use crate::model::{RetrievalResult, SearchHit};

pub const MAX_CRITERION_SCORE: u8 = 3;

const ANSWER_SYSTEM_PROMPT: &str = r#"You are a helpful lore expert on J.R.R. Tolkien's Middle-earth.
You can only answer questions about characters using the provided context retrieved from the database.
The context includes structured information such as: name, race, titles, realm, family relations, birth and death dates, and short descriptions.

Guidelines:
- If the answer is found in the context, respond clearly and directly.
- If the answer is not in the context, say you don't know or that the information was not provided.
- Do not invent new facts outside the context.
- Keep your answers concise, but include all relevant details from the context.
- If the user asks for speculation (e.g., "what would happen if X met Y?"), you can summarize based only on what the context says about their traits."#;

const JUDGE_SYSTEM_PROMPT: &str = r#"You are an impartial evaluator assessing RAG (Retrieval-Augmented Generation) system outputs for questions about J.R.R. Tolkien's Middle-earth characters.

Evaluate each answer on four criteria using a 0-3 scale:

1. Relevance (0-3): Does the answer directly address the question?
   - 3: Fully addresses the question
   - 2: Mostly relevant with minor tangents
   - 1: Partially relevant, significant gaps
   - 0: Irrelevant or off-topic

2. Groundedness (0-3): Are all facts supported by the context?
   - 3: All claims supported, no hallucinations
   - 2: Mostly grounded, one minor unsupported detail
   - 1: Multiple unsupported claims
   - 0: Significant hallucinations or contradicts context

3. Completeness (0-3): Does the answer include key details from context?
   - 3: All important information included
   - 2: Most key details present, minor omissions
   - 1: Missing significant information
   - 0: Incomplete or vague

4. Faithfulness (0-3): Is the answer concise, factual, and honest about limitations?
   - 3: Concise, factual, admits gaps appropriately
   - 2: Mostly faithful, slightly verbose or assumes minor details
   - 1: Invents information or doesn't admit uncertainty
   - 0: Violates multiple guidelines

Your output must be a single valid JSON object:
{
  "relevance": <0-3>,
  "groundedness": <0-3>,
  "completeness": <0-3>,
  "faithfulness": <0-3>,
  "comments": "<1-2 sentence summary of reasoning>"
}

Output only the JSON object, no markdown and no extra text."#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub relevance: u8,
    pub groundedness: u8,
    pub completeness: u8,
    pub faithfulness: u8,
    #[serde(default)]
    pub comments: String,
}

impl JudgeVerdict {
    fn scores(&self) -> [(&'static str, u8); 4] {
        [
            ("relevance", self.relevance),
            ("groundedness", self.groundedness),
            ("completeness", self.completeness),
            ("faithfulness", self.faithfulness),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgedAnswer {
    pub question: String,
    pub answer: String,
    #[serde(flatten)]
    pub verdict: JudgeVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSummary {
    pub entries: usize,
    pub avg_relevance: f64,
    pub avg_groundedness: f64,
    pub avg_completeness: f64,
    pub avg_faithfulness: f64,
    pub total_avg_score: f64,
}

pub fn hits_context(hits: &[SearchHit]) -> String {
    let entries = hits
        .iter()
        .map(|hit| {
            let mut object = Map::new();
            object.insert("id".to_string(), Value::String(hit.id.clone()));
            object.insert("score".to_string(), Value::from(hit.score));
            for (key, value) in hit.attributes.present_fields() {
                object.insert(key.to_string(), Value::String(value.to_string()));
            }
            Value::Object(object)
        })
        .collect::<Vec<Value>>();

    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

pub fn answer_prompt(question: &str, context: &str) -> PromptPair {
    PromptPair {
        system: ANSWER_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Context from database:\n{context}\n\nUser question:\n{question}\n\nAnswer the question using ONLY the context above."
        ),
    }
}

pub fn judge_prompt(question: &str, context: &str, answer: &str) -> PromptPair {
    PromptPair {
        system: JUDGE_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Evaluate the following RAG output:\n\nQuestion: {question}\n\nContext: {context}\n\nAnswer: {answer}"
        ),
    }
}

pub fn parse_verdict(raw: &str) -> Result<JudgeVerdict, EvalError> {
    let verdict: JudgeVerdict = serde_json::from_str(raw.trim())
        .map_err(|err| EvalError::malformed(format!("judge verdict is not valid JSON: {err}")))?;

    if let Some((name, score)) = verdict
        .scores()
        .into_iter()
        .find(|(_, score)| *score > MAX_CRITERION_SCORE)
    {
        return Err(EvalError::malformed(format!(
            "{name} score {score} is outside 0..={MAX_CRITERION_SCORE}"
        )));
    }
    Ok(verdict)
}

pub struct RagJudge<A, J> {
    answerer: A,
    judge: J,
}

impl<A: Completion, J: Completion> RagJudge<A, J> {
    pub fn new(answerer: A, judge: J) -> Self {
        Self { answerer, judge }
    }

    pub fn evaluate(&self, result: &RetrievalResult) -> Result<JudgedAnswer, EvalError> {
        let context = hits_context(&result.search_results);

        let prompt = answer_prompt(&result.question, &context);
        let answer = self.answerer.complete(&prompt.system, &prompt.user)?;

        let prompt = judge_prompt(&result.question, &context, &answer);
        let raw_verdict = self.judge.complete(&prompt.system, &prompt.user)?;
        let verdict = parse_verdict(&raw_verdict)?;
        debug!(
            record_id = %result.id,
            question_idx = result.question_idx,
            relevance = verdict.relevance,
            groundedness = verdict.groundedness,
            "answer judged"
        );

        Ok(JudgedAnswer {
            question: result.question.clone(),
            answer,
            verdict,
        })
    }
}

pub fn summarize(judged: &[JudgedAnswer]) -> Result<JudgeSummary, EvalError> {
    if judged.is_empty() {
        return Err(EvalError::DivisionByZero {
            metric: "judge averages",
        });
    }

    let count = judged.len() as f64;
    let total = |pick: fn(&JudgeVerdict) -> u8| {
        judged
            .iter()
            .map(|entry| f64::from(pick(&entry.verdict)))
            .sum::<f64>()
    };

    let relevance = total(|verdict| verdict.relevance);
    let groundedness = total(|verdict| verdict.groundedness);
    let completeness = total(|verdict| verdict.completeness);
    let faithfulness = total(|verdict| verdict.faithfulness);

    Ok(JudgeSummary {
        entries: judged.len(),
        avg_relevance: relevance / count,
        avg_groundedness: groundedness / count,
        avg_completeness: completeness / count,
        avg_faithfulness: faithfulness / count,
        total_avg_score: (relevance + groundedness + completeness + faithfulness) / (count * 4.0),
    })
}
