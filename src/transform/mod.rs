//! Transform client abstraction and implementations.
//!
//! A [`TransformClient`] sends one chunk's [`Conversation`] to the remote
//! service and returns a tagged [`Fragment`]: `Complete`, `Incomplete`, or an
//! error. It is built in two layers:
//!
//! - **[`ChatBackend`]**: speaks one service's wire format and returns the
//!   raw reply plus the service's structural [`StopReason`]:
//!   [`OpenAiBackend`], [`AnthropicBackend`], and the offline [`EchoBackend`].
//! - **[`CompletionProtocol`]**: decides whether a raw reply is complete,
//!   from the stop reason, a textual sentinel, or a structured JSON body, and
//!   strips the sentinel from the returned text.
//!
//! [`ServiceClient`] glues the two together. No retry happens at this layer:
//! errors go straight back to the continuation controller, which fails the
//! chunk.
//!
//! # Client Selection
//!
//! Use [`create_client`] to build the single client for the process:
//!
//! | `model.provider` | Backend |
//! |------------------|---------|
//! | `"openai"` | [`OpenAiBackend`] (`POST {base_url}/chat/completions`) |
//! | `"anthropic"` | [`AnthropicBackend`] (`POST {base_url}/v1/messages`) |
//! | `"echo"` | [`EchoBackend`] (no network) |

mod anthropic;
mod echo;
mod openai;

pub use anthropic::AnthropicBackend;
pub use echo::EchoBackend;
pub use openai::OpenAiBackend;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::conversation::Conversation;
use crate::models::Fragment;

/// Failure of a single transform call.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service returned error status {status}: {body}")]
    Service { status: u16, body: String },

    #[error("malformed service response: {0}")]
    Malformed(String),

    #[error("service stopped without finishing: {0}")]
    Refused(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransformError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransformError::Timeout(timeout)
        } else if err.is_decode() {
            TransformError::Malformed(err.to_string())
        } else {
            TransformError::Transport(err.to_string())
        }
    }
}

/// Why the service stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Finished normally.
    Stop,
    /// Ran out of output budget.
    Length,
    /// Anything else the service reported (content filter, refusal, ...).
    Other(String),
}

/// Unparsed reply from a [`ChatBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub content: String,
    pub stop: StopReason,
}

/// Speaks one service's request/response schema.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier sent to the service.
    fn model_name(&self) -> &str;

    async fn complete(&self, conversation: &Conversation) -> Result<RawReply, TransformError>;
}

/// Sends a conversation and returns a tagged fragment.
#[async_trait]
pub trait TransformClient: Send + Sync {
    fn model_name(&self) -> &str {
        "unknown"
    }

    async fn send(&self, conversation: &Conversation) -> Result<Fragment, TransformError>;
}

/// How completeness of a reply is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionProtocol {
    /// Trust the structural stop reason; the sentinel is still honoured.
    StopReason,
    /// The service is asked to end an unfinished reply with the sentinel.
    /// Unrecognised stop reasons are not treated as failures.
    Sentinel,
    /// The service replies with `{"code": ..., "finished": bool}`.
    Json,
}

impl CompletionProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionProtocol::StopReason => "stop-reason",
            CompletionProtocol::Sentinel => "sentinel",
            CompletionProtocol::Json => "json",
        }
    }

    /// Turn a raw reply into a sentinel-free, tagged fragment.
    pub fn interpret(&self, reply: RawReply, sentinel: &str) -> Result<Fragment, TransformError> {
        match self {
            CompletionProtocol::StopReason => {
                if let StopReason::Other(reason) = &reply.stop {
                    return Err(TransformError::Refused(reason.clone()));
                }
                let (text, marked) = strip_sentinel(&reply.content, sentinel);
                Ok(tag(text, marked || reply.stop == StopReason::Length))
            }
            CompletionProtocol::Sentinel => {
                let (text, marked) = strip_sentinel(&reply.content, sentinel);
                Ok(tag(text, marked || reply.stop == StopReason::Length))
            }
            CompletionProtocol::Json => {
                match &reply.stop {
                    StopReason::Stop => {}
                    StopReason::Length => {
                        return Err(TransformError::Malformed(
                            "structured response truncated by output limit".to_string(),
                        ))
                    }
                    StopReason::Other(reason) => {
                        return Err(TransformError::Refused(reason.clone()))
                    }
                }
                let (body, finished) = parse_structured(&reply.content)?;
                let (text, marked) = strip_sentinel(&body, sentinel);
                Ok(tag(text, marked || !finished))
            }
        }
    }
}

fn tag(text: String, incomplete: bool) -> Fragment {
    if incomplete {
        Fragment::incomplete(text)
    } else {
        Fragment::complete(text)
    }
}

/// Remove every occurrence of `sentinel` from `text`.
///
/// Lines that consist only of the sentinel are dropped entirely. Removal is
/// repeated until no occurrence is left, so text like `//con//continuetinue`
/// cannot reassemble a new sentinel. Returns whether any occurrence existed.
pub fn strip_sentinel(text: &str, sentinel: &str) -> (String, bool) {
    if sentinel.is_empty() || !text.contains(sentinel) {
        return (text.to_string(), false);
    }

    let mut out: String = text
        .split_inclusive('\n')
        .filter(|line| line.trim() != sentinel)
        .collect();
    while out.contains(sentinel) {
        out = out.replace(sentinel, "");
    }
    (out, true)
}

/// Parse a structured-output body: a JSON object with a `code` or `text`
/// string and a `finished` boolean, optionally wrapped in a code fence.
fn parse_structured(content: &str) -> Result<(String, bool), TransformError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let json: serde_json::Value = serde_json::from_str(unfenced.trim())
        .map_err(|e| TransformError::Malformed(format!("body is not JSON: {}", e)))?;

    let body = json
        .get("code")
        .or_else(|| json.get("text"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| TransformError::Malformed("missing string field 'code'".to_string()))?;
    let finished = json
        .get("finished")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| TransformError::Malformed("missing boolean field 'finished'".to_string()))?;

    Ok((body.to_string(), finished))
}

/// A [`ChatBackend`] paired with a [`CompletionProtocol`].
pub struct ServiceClient {
    backend: Box<dyn ChatBackend>,
    protocol: CompletionProtocol,
    sentinel: String,
}

impl ServiceClient {
    pub fn new(
        backend: Box<dyn ChatBackend>,
        protocol: CompletionProtocol,
        sentinel: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            protocol,
            sentinel: sentinel.into(),
        }
    }
}

#[async_trait]
impl TransformClient for ServiceClient {
    fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    async fn send(&self, conversation: &Conversation) -> Result<Fragment, TransformError> {
        let reply = self.backend.complete(conversation).await?;
        self.protocol.interpret(reply, &self.sentinel)
    }
}

/// Build the process-wide [`TransformClient`] from configuration.
///
/// The HTTP client and credentials are resolved once here; the returned
/// client is shared read-only by every chunk.
///
/// # Errors
///
/// Returns an error for unknown providers, a missing API key, or an HTTP
/// client that cannot be built.
pub fn create_client(config: &Config) -> Result<Box<dyn TransformClient>> {
    let task = config.task_profile()?;
    let limits = config.model_limits();
    let timeout = config.call_timeout();

    let backend: Box<dyn ChatBackend> = match config.model.provider.as_str() {
        "openai" => {
            let api_key = resolve_api_key(config, "OPENAI_API_KEY")?;
            Box::new(OpenAiBackend::new(
                config,
                api_key,
                limits.max_output_tokens,
                task.protocol == CompletionProtocol::Json,
                timeout,
            )?)
        }
        "anthropic" => {
            let api_key = resolve_api_key(config, "ANTHROPIC_API_KEY")?.ok_or_else(|| {
                anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set")
            })?;
            Box::new(AnthropicBackend::new(
                config,
                api_key,
                limits.max_output_tokens,
                timeout,
            )?)
        }
        "echo" => Box::new(
            EchoBackend::new(&config.model.name, &task.user_template)
                .with_json_replies(task.protocol == CompletionProtocol::Json),
        ),
        other => bail!("Unknown model provider: {}", other),
    };

    Ok(Box::new(ServiceClient::new(
        backend,
        task.protocol,
        config.continuation.sentinel.clone(),
    )))
}

/// Read the API key from `model.api_key_env` or `default_env`.
///
/// A missing key is only an error for the default endpoint; a custom
/// `base_url` (local server, proxy) may not need one.
fn resolve_api_key(config: &Config, default_env: &str) -> Result<Option<String>> {
    let var = config.model.api_key_env.as_deref().unwrap_or(default_env);
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(Some(key.trim().to_string())),
        _ if config.model.base_url.is_some() => Ok(None),
        _ => bail!("{} environment variable not set", var),
    }
}
