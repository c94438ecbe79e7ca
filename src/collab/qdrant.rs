use reqwest::blocking::Client;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{SearchIndex, http_client, send_json};
use crate::error::EvalError;
use crate::model::SearchHit;

pub const DEFAULT_COLLECTION: &str = "lotr-characters";
pub const DEFAULT_JINA_URL: &str = "https://api.jina.ai/v1/embeddings";
pub const DEFAULT_JINA_MODEL: &str = "jina-embeddings-v4";
pub const EMBEDDING_DIMENSION: usize = 512;
const QUERYING_TASK: &str = "retrieval.query";

pub struct JinaEmbedder {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl JinaEmbedder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EvalError> {
        Ok(Self {
            client: http_client("jina")?,
            url: DEFAULT_JINA_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_JINA_MODEL.to_string(),
            dimensions: EMBEDDING_DIMENSION,
        })
    }

    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>, EvalError> {
        let body = json!({
            "input": [text],
            "model": self.model,
            "dimensions": self.dimensions,
            "task": QUERYING_TASK,
            "late_chunking": true,
        });

        let request = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);

        let response = send_json("jina", request)?;
        parse_embedding(&response, self.dimensions)
    }
}

pub struct QdrantSearch {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    embedder: JinaEmbedder,
}

impl QdrantSearch {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        collection: impl Into<String>,
        embedder: JinaEmbedder,
    ) -> Result<Self, EvalError> {
        Ok(Self {
            client: http_client("qdrant")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            collection: collection.into(),
            embedder,
        })
    }
}

impl SearchIndex for QdrantSearch {
    fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SearchHit>, EvalError> {
        let vector = self.embedder.embed_query(query)?;
        let url = format!(
            "{}/collections/{}/points/query",
            self.base_url, self.collection
        );
        debug!(url = %url, limit, threshold, "querying qdrant");

        let mut request = self.client.post(&url).json(&json!({
            "query": vector,
            "limit": limit,
            "score_threshold": threshold,
            "with_payload": true,
        }));
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key);
        }

        let response = send_json("qdrant", request)?;
        parse_points(&response)
    }
}

fn parse_embedding(body: &Value, expected_dim: usize) -> Result<Vec<f32>, EvalError> {
    let values = body
        .pointer("/data/0/embedding")
        .and_then(Value::as_array)
        .ok_or_else(|| EvalError::collaborator("jina", "response has no data[0].embedding"))?;

    let embedding = values
        .iter()
        .map(|value| value.as_f64().map(|value| value as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| EvalError::collaborator("jina", "embedding contains non-numeric values"))?;

    if embedding.len() != expected_dim {
        return Err(EvalError::collaborator(
            "jina",
            format!(
                "expected {expected_dim} embedding dimensions, got {}",
                embedding.len()
            ),
        ));
    }
    Ok(embedding)
}

fn parse_points(body: &Value) -> Result<Vec<SearchHit>, EvalError> {
    let points = body
        .pointer("/result/points")
        .and_then(Value::as_array)
        .ok_or_else(|| EvalError::collaborator("qdrant", "response has no result.points"))?;

    points
        .iter()
        .map(|point| {
            let mut object = point
                .get("payload")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);
            object.insert("id".to_string(), point.get("id").cloned().unwrap_or(Value::Null));
            object.insert(
                "score".to_string(),
                point.get("score").cloned().unwrap_or(Value::Null),
            );

            serde_json::from_value::<SearchHit>(Value::Object(object)).map_err(|err| {
                EvalError::collaborator("qdrant", format!("malformed point: {err}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_embedding, parse_points};
    use serde_json::json;

    #[test]
    fn points_merge_payload_with_id_and_score() {
        let body = json!({
            "result": {
                "points": [
                    { "id": "9f1c", "score": 0.91, "payload": { "name": "Finrod", "race": "Elves" } },
                    { "id": 17, "score": 0.42, "payload": { "name": "Húrin" } }
                ]
            }
        });

        let hits = parse_points(&body).expect("points should parse");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "9f1c");
        assert_eq!(hits[0].attributes.race.as_deref(), Some("Elves"));
        assert_eq!(hits[1].id, "17");
        assert!((hits[1].score - 0.42).abs() < 1e-12);
    }

    #[test]
    fn missing_points_is_a_collaborator_failure() {
        let error = parse_points(&json!({ "status": "ok" })).expect_err("should fail");
        assert_eq!(error.kind(), "collaborator_failure");
    }

    #[test]
    fn embedding_dimension_is_checked() {
        let body = json!({ "data": [{ "embedding": [0.1, 0.2, 0.3] }] });
        assert_eq!(parse_embedding(&body, 3).unwrap().len(), 3);
        assert!(parse_embedding(&body, 512).is_err());
    }
}
