use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biography: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
}

impl CharacterAttributes {
    pub fn present_fields(&self) -> Vec<(&'static str, &str)> {
        let fields = [
            ("name", &self.name),
            ("race", &self.race),
            ("gender", &self.gender),
            ("realm", &self.realm),
            ("culture", &self.culture),
            ("birth", &self.birth),
            ("death", &self.death),
            ("spouse", &self.spouse),
            ("hair", &self.hair),
            ("height", &self.height),
            ("biography", &self.biography),
            ("history", &self.history),
        ];

        fields
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(|value| (key, value))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    #[serde(deserialize_with = "deserialize_point_id")]
    pub id: String,
    #[serde(default)]
    pub payload: CharacterAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenQuestion {
    #[serde(deserialize_with = "deserialize_point_id")]
    pub id: String,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(deserialize_with = "deserialize_point_id")]
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(flatten)]
    pub attributes: CharacterAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(deserialize_with = "deserialize_point_id")]
    pub id: String,
    pub question: String,
    pub question_idx: usize,
    pub search_results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPair {
    pub record_id: String,
    pub question_idx: usize,
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRunPaths {
    pub golden_questions_path: String,
    pub results_path: String,
    pub checkpoint_db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub checkpoint_key: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub requests_per_minute: u32,
    pub search_limit: usize,
    pub search_threshold: f64,
    pub batch_size: Option<usize>,
    pub batch_index: Option<usize>,
    pub total_pairs: usize,
    pub start_index: usize,
    pub resume_index: usize,
    pub salvaged_results: usize,
    pub failed_pair: Option<FailedPair>,
    pub failure_kind: Option<String>,
    pub failure_reason: Option<String>,
    pub golden_questions_sha256: String,
    pub paths: RetrievalRunPaths,
    pub warnings: Vec<String>,
}

fn deserialize_point_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(id) => Ok(id),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "point id must be a string or integer, got {other}"
        ))),
    }
}
