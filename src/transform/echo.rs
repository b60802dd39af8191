//! Offline backend that returns the chunk unchanged.
//!
//! Used for dry runs and end-to-end tests: the pipeline (splitting,
//! ordering, output mirroring) runs exactly as with a real service, and the
//! output equals the input. With JSON replies enabled the chunk is wrapped
//! as `{"code": ..., "finished": true}` for the `json` protocol.

use async_trait::async_trait;

use super::{ChatBackend, RawReply, StopReason, TransformError};
use crate::conversation::Conversation;
use crate::tasks::TEXT_PLACEHOLDER;

pub struct EchoBackend {
    model: String,
    prefix: String,
    suffix: String,
    json: bool,
}

impl EchoBackend {
    /// `user_template` is the template the first user turn was built from;
    /// its text around the placeholder is removed before echoing.
    pub fn new(model: &str, user_template: &str) -> Self {
        let (prefix, suffix) = match user_template.split_once(TEXT_PLACEHOLDER) {
            Some((p, s)) => (p.to_string(), s.to_string()),
            None => (format!("{}\n", user_template), String::new()),
        };
        Self {
            model: model.to_string(),
            prefix,
            suffix,
            json: false,
        }
    }

    /// Wrap replies in the structured body the `json` protocol expects.
    pub fn with_json_replies(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

#[async_trait]
impl ChatBackend for EchoBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, conversation: &Conversation) -> Result<RawReply, TransformError> {
        // Only the first user turn carries the chunk.
        let content = if conversation.replies() == 0 {
            let prompt = conversation.last_user().unwrap_or_default();
            let payload = prompt.strip_prefix(self.prefix.as_str()).unwrap_or(prompt);
            payload
                .strip_suffix(self.suffix.as_str())
                .unwrap_or(payload)
                .to_string()
        } else {
            String::new()
        };
        let content = if self.json {
            serde_json::json!({ "code": content, "finished": true }).to_string()
        } else {
            content
        };

        Ok(RawReply {
            content,
            stop: StopReason::Stop,
        })
    }
}
