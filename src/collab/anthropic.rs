use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{Completion, http_client, send_json};
use crate::error::EvalError;

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

const COLLABORATOR: &str = "anthropic";

pub struct AnthropicChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, EvalError> {
        Ok(Self {
            client: http_client(COLLABORATOR)?,
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Completion for AnthropicChat {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, EvalError> {
        let url = format!("{}/messages", self.base_url);
        debug!(url = %url, model = %self.model, "sending messages request");

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_prompt }],
        });

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response = send_json(COLLABORATOR, request)?;
        parse_text_blocks(&response)
    }
}

fn parse_text_blocks(body: &Value) -> Result<String, EvalError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| EvalError::collaborator(COLLABORATOR, "response has no content array"))?;

    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("");

    if text.is_empty() {
        return Err(EvalError::collaborator(
            COLLABORATOR,
            "response contained no text blocks",
        ));
    }
    Ok(text)
}
