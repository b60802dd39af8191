//! Anthropic messages backend.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::{ChatBackend, RawReply, StopReason, TransformError};
use crate::config::Config;
use crate::conversation::Conversation;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Calls `POST {base_url}/v1/messages`. The system instruction travels in
/// the top-level `system` field; the remaining turns go in `messages`.
pub struct AnthropicBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: Option<f32>,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn new(
        config: &Config,
        api_key: String,
        max_tokens: usize,
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
            timeout,
        })
    }

    fn request_body(&self, conversation: &Conversation) -> serde_json::Value {
        let messages: Vec<&crate::conversation::Message> = conversation.turns().collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": conversation.system(),
            "messages": messages,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, conversation: &Conversation) -> Result<RawReply, TransformError> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&self.request_body(conversation))
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
        parse_anthropic_reply(&json)
    }
}

/// Concatenate the `text` content blocks and map `stop_reason`.
fn parse_anthropic_reply(json: &serde_json::Value) -> Result<RawReply, TransformError> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| TransformError::Malformed("missing content array".to_string()))?;

    let content: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
        .collect();

    let stop = match json.get("stop_reason").and_then(|r| r.as_str()) {
        Some("end_turn") | Some("stop_sequence") => StopReason::Stop,
        Some("max_tokens") => StopReason::Length,
        Some(other) => StopReason::Other(other.to_string()),
        None => return Err(TransformError::Malformed("missing stop_reason".to_string())),
    };

    Ok(RawReply { content, stop })
}
