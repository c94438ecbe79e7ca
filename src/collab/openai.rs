use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{Completion, http_client, send_json};
use crate::error::EvalError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_TEMPERATURE: f64 = 0.5;

const COLLABORATOR: &str = "openai";

pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, EvalError> {
        Ok(Self {
            client: http_client(COLLABORATOR)?,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: DEFAULT_OPENAI_TEMPERATURE,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": self.temperature,
        })
    }
}

impl Completion for OpenAiChat {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, EvalError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "sending chat completion request");

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(system_prompt, user_prompt));

        let body = send_json(COLLABORATOR, request)?;
        parse_message_content(&body)
    }
}

fn parse_message_content(body: &Value) -> Result<String, EvalError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            EvalError::collaborator(COLLABORATOR, "response has no choices[0].message.content")
        })
}

#[cfg(test)]
mod tests {
    use super::parse_message_content;
    use serde_json::json;

    #[test]
    fn extracts_first_choice_content() {
        let body = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "[\"q1\"]" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        });
        assert_eq!(parse_message_content(&body).unwrap(), "[\"q1\"]");
    }

    #[test]
    fn missing_content_is_a_collaborator_failure() {
        let body = json!({ "choices": [] });
        let error = parse_message_content(&body).expect_err("empty choices should fail");
        assert_eq!(error.kind(), "collaborator_failure");
    }
}
