use std::time::Duration;

use crate::error::EvalError;
use crate::model::SearchHit;

pub mod anthropic;
pub mod openai;
pub mod qdrant;

pub use self::anthropic::AnthropicChat;
pub use self::openai::OpenAiChat;
pub use self::qdrant::{JinaEmbedder, QdrantSearch};

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub trait SearchIndex {
    fn search(&self, query: &str, limit: usize, threshold: f64)
    -> Result<Vec<SearchHit>, EvalError>;
}

pub trait Completion {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, EvalError>;
}

impl<T: SearchIndex + ?Sized> SearchIndex for &T {
    fn search(
        &self,
        query: &str,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SearchHit>, EvalError> {
        (**self).search(query, limit, threshold)
    }
}

impl<T: Completion + ?Sized> Completion for &T {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, EvalError> {
        (**self).complete(system_prompt, user_prompt)
    }
}

impl<T: Completion + ?Sized> Completion for Box<T> {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, EvalError> {
        (**self).complete(system_prompt, user_prompt)
    }
}

pub(crate) fn http_client(collaborator: &'static str) -> Result<reqwest::blocking::Client, EvalError> {
    reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| EvalError::collaborator(collaborator, format!("failed to build client: {err}")))
}

pub(crate) fn send_json(
    collaborator: &'static str,
    request: reqwest::blocking::RequestBuilder,
) -> Result<serde_json::Value, EvalError> {
    let response = request.send().map_err(|err| {
        let message = if err.is_timeout() {
            format!("request timed out after {}s", HTTP_TIMEOUT.as_secs())
        } else {
            format!("request failed: {err}")
        };
        EvalError::collaborator(collaborator, message)
    })?;

    let status = response.status();
    let body = response.text().map_err(|err| {
        EvalError::collaborator(collaborator, format!("failed to read response body: {err}"))
    })?;

    if !status.is_success() {
        return Err(EvalError::collaborator(
            collaborator,
            format!("HTTP {status}: {body}"),
        ));
    }

    serde_json::from_str(&body)
        .map_err(|err| EvalError::collaborator(collaborator, format!("invalid JSON: {err}")))
}
