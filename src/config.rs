//! TOML configuration.
//!
//! Every field has a default, so an absent file behaves like an empty one.
//! Task-dependent settings (`policy`, `unit`, `max_units`, `protocol`,
//! `suffix`) are optional here and fall back to the selected task's profile.
//!
//! ```toml
//! [task]
//! name = "clean-text"
//!
//! [model]
//! provider = "openai"
//! name = "gpt-4o-mini"
//! timeout_secs = 180
//!
//! [chunking]
//! max_units = 10000
//!
//! [continuation]
//! max_continuations = 10
//!
//! [output]
//! debug_dir = "debug_chunks"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chunk::{BoundaryPolicy, DEFAULT_CLOSING_MARKERS};
use crate::tasks::{self, TaskProfile};
use crate::tokenize::LengthUnit;
use crate::transform::CompletionProtocol;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub continuation: ContinuationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaskConfig {
    #[serde(default = "default_task")]
    pub name: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub user_template: Option<String>,
    #[serde(default)]
    pub continue_prompt: Option<String>,
    #[serde(default)]
    pub include_globs: Option<Vec<String>>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: default_task(),
            system: None,
            user_template: None,
            continue_prompt: None,
            include_globs: None,
        }
    }
}

fn default_task() -> String {
    "doxygen".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub name: String,
    /// Override for OpenAI-compatible or Anthropic endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub context_tokens: Option<usize>,
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model(),
            base_url: None,
            api_key_env: None,
            temperature: None,
            context_tokens: None,
            max_output_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    180
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub policy: Option<BoundaryPolicy>,
    #[serde(default)]
    pub unit: Option<LengthUnit>,
    #[serde(default)]
    pub max_units: Option<usize>,
    #[serde(default = "default_closing_markers")]
    pub closing_markers: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            policy: None,
            unit: None,
            max_units: None,
            closing_markers: default_closing_markers(),
        }
    }
}

fn default_closing_markers() -> Vec<String> {
    DEFAULT_CLOSING_MARKERS.iter().map(|m| m.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContinuationConfig {
    #[serde(default = "default_max_continuations")]
    pub max_continuations: u32,
    #[serde(default)]
    pub protocol: Option<CompletionProtocol>,
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            max_continuations: default_max_continuations(),
            protocol: None,
            sentinel: default_sentinel(),
        }
    }
}

fn default_max_continuations() -> u32 {
    10
}
fn default_sentinel() -> String {
    "//continue".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
    #[serde(default)]
    pub suffix: Option<String>,
}

/// Context window and output budget of a model, in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    pub context_tokens: usize,
    pub max_output_tokens: usize,
}

/// Known limits for common models; unknown models get a conservative
/// 16k/4k budget.
pub fn known_model_limits(model: &str) -> ModelLimits {
    let (context_tokens, max_output_tokens) = match model {
        "gpt-4o-mini" | "gpt-4o" => (128_000, 16_384),
        "gpt-4.1" | "gpt-4.1-mini" | "gpt-4.1-nano" => (1_047_576, 32_768),
        "gpt-4-turbo" | "gpt-4-1106-preview" | "gpt-4-0125-preview" => (128_000, 4_096),
        "gpt-4" => (8_192, 4_096),
        "gpt-3.5-turbo" | "gpt-3.5-turbo-1106" => (16_385, 4_096),
        m if m.starts_with("claude-") => (200_000, 8_192),
        _ => (16_384, 4_096),
    };
    ModelLimits {
        context_tokens,
        max_output_tokens,
    }
}

/// Approximate chars-per-token ratio used when the bound is in chars.
const CHARS_PER_TOKEN: usize = 4;

impl Config {
    /// Defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// The selected task with `[task]` overrides applied.
    pub fn task_profile(&self) -> Result<TaskProfile> {
        let mut task = tasks::find(&self.task.name)?;
        if let Some(system) = &self.task.system {
            task.system = system.clone();
        }
        if let Some(template) = &self.task.user_template {
            task.user_template = template.clone();
        }
        if let Some(prompt) = &self.task.continue_prompt {
            task.continue_prompt = prompt.clone();
        }
        if let Some(globs) = &self.task.include_globs {
            task.include_globs = globs.clone();
        }
        if let Some(policy) = self.chunking.policy {
            task.policy = policy;
        }
        if let Some(unit) = self.chunking.unit {
            task.unit = unit;
        }
        if let Some(max_units) = self.chunking.max_units {
            task.max_units = max_units;
        }
        if let Some(protocol) = self.continuation.protocol {
            task.protocol = protocol;
        }
        if let Some(suffix) = &self.output.suffix {
            task.output_suffix = suffix.clone();
        }
        Ok(task)
    }

    pub fn model_limits(&self) -> ModelLimits {
        let known = known_model_limits(&self.model.name);
        ModelLimits {
            context_tokens: self.model.context_tokens.unwrap_or(known.context_tokens),
            max_output_tokens: self
                .model
                .max_output_tokens
                .unwrap_or(known.max_output_tokens),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.model.timeout_secs)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let task = self.task_profile()?;

        if task.max_units == 0 {
            bail!("chunking.max_units must be > 0");
        }
        if self.model.timeout_secs == 0 {
            bail!("model.timeout_secs must be > 0");
        }
        if self.continuation.sentinel.trim().is_empty() {
            bail!("continuation.sentinel must not be empty");
        }

        match self.model.provider.as_str() {
            "openai" | "anthropic" | "echo" => {}
            other => bail!(
                "Unknown model provider: '{}'. Must be openai, anthropic, or echo.",
                other
            ),
        }

        if task.protocol == CompletionProtocol::Json && self.model.provider == "anthropic" {
            bail!("continuation.protocol = \"json\" requires an OpenAI-compatible provider");
        }

        let limits = self.model_limits();
        if limits.max_output_tokens >= limits.context_tokens {
            bail!(
                "model.max_output_tokens ({}) must be smaller than the context window ({})",
                limits.max_output_tokens,
                limits.context_tokens
            );
        }
        let input_tokens = match task.unit {
            LengthUnit::Tokens => task.max_units,
            LengthUnit::Chars => task.max_units.div_ceil(CHARS_PER_TOKEN),
        };
        let budget = limits.context_tokens - limits.max_output_tokens;
        if input_tokens > budget {
            bail!(
                "chunking.max_units ({} {}) does not fit model '{}': {} tokens of context minus {} reserved for output",
                task.max_units,
                task.unit.as_str(),
                self.model.name,
                limits.context_tokens,
                limits.max_output_tokens
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_empty_config_is_valid() {
        let cfg = parse("");
        cfg.validate().unwrap();
        assert_eq!(cfg.task.name, "doxygen");
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.continuation.max_continuations, 10);
        assert_eq!(cfg.continuation.sentinel, "//continue");
    }

    #[test]
    fn test_task_defaults_flow_through() {
        let cfg = parse("[task]\nname = \"clean-text\"\n");
        let task = cfg.task_profile().unwrap();
        assert_eq!(task.policy, BoundaryPolicy::Prose);
        assert_eq!(task.unit, LengthUnit::Tokens);
        assert_eq!(task.max_units, 10_000);
        assert_eq!(task.protocol, CompletionProtocol::StopReason);
    }

    #[test]
    fn test_overrides_apply() {
        let cfg = parse(
            r#"
[chunking]
policy = "prose"
unit = "chars"
max_units = 1234

[continuation]
protocol = "json"

[output]
suffix = "_doc"
"#,
        );
        let task = cfg.task_profile().unwrap();
        assert_eq!(task.policy, BoundaryPolicy::Prose);
        assert_eq!(task.unit, LengthUnit::Chars);
        assert_eq!(task.max_units, 1234);
        assert_eq!(task.protocol, CompletionProtocol::Json);
        assert_eq!(task.output_suffix, "_doc");
    }

    #[test]
    fn test_zero_max_units_rejected() {
        let cfg = parse("[chunking]\nmax_units = 0\n");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let cfg = parse("[model]\nprovider = \"bard\"\n");
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("bard"));
    }

    #[test]
    fn test_chunk_must_fit_context() {
        let cfg = parse(
            r#"
[task]
name = "clean-text"

[model]
name = "gpt-4"

[chunking]
max_units = 6000
"#,
        );
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("does not fit"), "{}", err);
    }

    #[test]
    fn test_model_limits_override() {
        let cfg = parse("[model]\nname = \"local-llm\"\ncontext_tokens = 32000\n");
        let limits = cfg.model_limits();
        assert_eq!(limits.context_tokens, 32_000);
        assert_eq!(limits.max_output_tokens, 4_096);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let cfg = load_or_default(Path::new("/nonexistent/docpass.toml")).unwrap();
        assert_eq!(cfg.task.name, "doxygen");
    }

    #[test]
    fn test_example_config_is_valid() {
        let cfg = parse(include_str!("../config/docpass.example.toml"));
        cfg.validate().unwrap();
        assert_eq!(cfg.continuation.sentinel, "//continue");
        assert_eq!(cfg.chunking.closing_markers, vec!["}".to_string()]);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docpass.toml");
        std::fs::write(&path, "[model]\nprovider = \"echo\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model.provider, "echo");
    }
}
