//! Core data models used throughout docpass.
//!
//! These types represent the documents, chunks, and fragments that flow
//! through the split → transform → continue → reassemble pipeline.

use serde::Serialize;
use std::path::PathBuf;

/// A loaded input document. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path the document was loaded from.
    pub source: PathBuf,
    /// Full UTF-8 text.
    pub text: String,
    /// Name that keys per-document artifacts: the file name, or the path
    /// relative to the input root in a directory run.
    pub name: PathBuf,
}

impl Document {
    pub fn new(source: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let source = source.into();
        let name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("document"));
        Self {
            source,
            text: text.into(),
            name,
        }
    }

    pub fn with_name(mut self, name: impl Into<PathBuf>) -> Self {
        self.name = name.into();
        self
    }
}

/// A contiguous, non-overlapping slice of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based sequence index; defines processing and output order.
    pub index: usize,
    pub text: String,
    /// Size in the splitter's accounting unit (tokens or chars).
    pub units: usize,
    /// Byte offset of the first byte in the document.
    pub start: usize,
    /// Byte offset one past the last byte in the document.
    pub end: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Whether the service finished its answer for the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Complete,
    Incomplete,
}

/// One reply of the transform service for one turn of a chunk's conversation.
///
/// `text` is already free of the continuation sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub completion: Completion,
}

impl Fragment {
    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completion: Completion::Complete,
        }
    }

    pub fn incomplete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completion: Completion::Incomplete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }
}

/// Terminal status of one chunk that was accepted into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Complete,
    /// Continuation cap reached while the service still reported
    /// incompleteness; the partial output is kept.
    Incomplete,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Complete => "complete",
            ChunkStatus::Incomplete => "incomplete",
        }
    }
}

/// Reassembled, sentinel-free output for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub index: usize,
    pub text: String,
    pub status: ChunkStatus,
    pub fragments: usize,
}
