//! OpenAI-compatible chat completions backend.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::{ChatBackend, RawReply, StopReason, TransformError};
use crate::config::Config;
use crate::conversation::Conversation;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Calls `POST {base_url}/chat/completions`.
///
/// Works against OpenAI and any server that mirrors its schema (vLLM,
/// Ollama's `/v1`, LiteLLM). In JSON mode the request asks for a
/// `json_object` response format.
pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
    json_mode: bool,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(
        config: &Config,
        api_key: Option<String>,
        max_tokens: usize,
        json_mode: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = config
            .model
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.name.clone(),
            max_tokens,
            temperature: config.model.temperature,
            json_mode,
            timeout,
        })
    }

    fn request_body(&self, conversation: &Conversation) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": conversation.messages(),
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if self.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, conversation: &Conversation) -> Result<RawReply, TransformError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&self.request_body(conversation));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransformError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransformError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TransformError::from_reqwest(e, self.timeout))?;
        parse_openai_reply(&json)
    }
}

/// Extract `choices[0].message.content` and `choices[0].finish_reason`.
fn parse_openai_reply(json: &serde_json::Value) -> Result<RawReply, TransformError> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| TransformError::Malformed("missing choices array".to_string()))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| TransformError::Malformed("missing message content".to_string()))?;

    let stop = match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("stop") => StopReason::Stop,
        Some("length") => StopReason::Length,
        Some(other) => StopReason::Other(other.to_string()),
        None => return Err(TransformError::Malformed("missing finish_reason".to_string())),
    };

    Ok(RawReply {
        content: content.to_string(),
        stop,
    })
}
