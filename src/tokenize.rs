//! Length estimation in a model's accounting unit.
//!
//! The splitter never measures text directly; it asks a [`LengthEstimator`].
//! Two estimators exist:
//!
//! - [`CharEstimator`]: Unicode scalar values, a cheap proxy.
//! - [`TiktokenEstimator`]: BPE tokens via `tiktoken-rs`, with the encoding
//!   chosen from the model identifier.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Unit that chunk bounds are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Tokens,
    Chars,
}

impl LengthUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::Tokens => "tokens",
            LengthUnit::Chars => "chars",
        }
    }
}

/// Measures text in one accounting unit.
pub trait LengthEstimator: Send + Sync {
    fn unit(&self) -> LengthUnit;

    /// Length of `text` in this estimator's unit.
    fn count(&self, text: &str) -> usize;

    /// Byte length of the longest char-boundary prefix of `text` whose
    /// length is `<= max`.
    ///
    /// For non-empty input the result is at least one character, so a
    /// caller that keeps consuming prefixes always makes progress.
    fn longest_prefix(&self, text: &str, max: usize) -> usize {
        if text.is_empty() {
            return 0;
        }

        // Exponential search: find a boundary `hi` that is over budget, or
        // discover that everything fits.
        let mut lo = 0usize;
        let mut candidate = ceil_boundary(text, max.saturating_mul(4).clamp(1, text.len()));
        loop {
            if self.count(&text[..candidate]) <= max {
                if candidate == text.len() {
                    return candidate;
                }
                lo = candidate;
                candidate = ceil_boundary(text, candidate.saturating_mul(2).min(text.len()));
            } else {
                break;
            }
        }
        let mut hi = candidate;

        // Binary search between a fitting `lo` and an overflowing `hi`.
        loop {
            let mut mid = floor_boundary(text, lo + (hi - lo) / 2);
            if mid <= lo {
                mid = ceil_boundary(text, lo + 1);
            }
            if mid >= hi {
                break;
            }
            if self.count(&text[..mid]) <= max {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        if lo == 0 {
            first_char_len(text)
        } else {
            lo
        }
    }
}

/// Counts Unicode scalar values.
pub struct CharEstimator;

impl LengthEstimator for CharEstimator {
    fn unit(&self) -> LengthUnit {
        LengthUnit::Chars
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }

    fn longest_prefix(&self, text: &str, max: usize) -> usize {
        if text.is_empty() {
            return 0;
        }
        let end = text
            .char_indices()
            .nth(max)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        end.max(first_char_len(text))
    }
}

/// Counts BPE tokens for a given model.
pub struct TiktokenEstimator {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenEstimator {
    /// Builds an estimator for `model`, falling back to `cl100k_base` when
    /// `tiktoken-rs` does not know the model.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base().context("Failed to load cl100k_base encoding")?,
        };
        Ok(Self { bpe })
    }
}

impl LengthEstimator for TiktokenEstimator {
    fn unit(&self) -> LengthUnit {
        LengthUnit::Tokens
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Create the estimator for `unit`.
pub fn create_estimator(unit: LengthUnit, model: &str) -> Result<Box<dyn LengthEstimator>> {
    match unit {
        LengthUnit::Chars => Ok(Box::new(CharEstimator)),
        LengthUnit::Tokens => Ok(Box::new(TiktokenEstimator::for_model(model)?)),
    }
}

fn first_char_len(text: &str) -> usize {
    text.chars().next().map(char::len_utf8).unwrap_or(0)
}

fn floor_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
