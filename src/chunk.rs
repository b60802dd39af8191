//! Boundary-aware document splitter.
//!
//! Partitions a document into ordered [`Chunk`]s, each at most `max_units`
//! long as measured by a [`LengthEstimator`], preferring natural cut points:
//!
//! - **Prose**: cut after the last sentence terminator (`. ! ? ; :`) inside
//!   the window that fits the bound. A sentence that alone exceeds the bound
//!   is kept whole as an oversized chunk. Text with no terminator anywhere
//!   ahead is cut at the hard bound.
//! - **Code**: accumulate whole lines; cut before a line that would overflow
//!   the bound, and after any line containing a closing marker (`}` by
//!   default). A single overlong line becomes its own chunk.
//!
//! Chunks never overlap and never drop bytes: concatenating their text in
//! index order reproduces the document exactly (see [`rejoin`]). Splitting
//! is deterministic and independent of any remote service.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::models::Chunk;
use crate::tokenize::LengthEstimator;

/// Characters that end a sentence for the prose policy.
pub const SENTENCE_TERMINATORS: [char; 5] = ['.', '!', '?', ';', ':'];

/// Default closing markers for the code policy.
pub const DEFAULT_CLOSING_MARKERS: [&str; 1] = ["}"];

/// Which boundary heuristic to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    Prose,
    Code,
}

impl BoundaryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryPolicy::Prose => "prose",
            BoundaryPolicy::Code => "code",
        }
    }
}

/// A configured splitter.
pub struct Splitter<'a> {
    max_units: usize,
    policy: BoundaryPolicy,
    closing_markers: Vec<String>,
    estimator: &'a dyn LengthEstimator,
}

impl<'a> Splitter<'a> {
    pub fn new(
        max_units: usize,
        policy: BoundaryPolicy,
        estimator: &'a dyn LengthEstimator,
    ) -> Self {
        Self {
            max_units,
            policy,
            closing_markers: DEFAULT_CLOSING_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            estimator,
        }
    }

    /// Replace the closing markers used by the code policy. Empty markers
    /// are ignored.
    pub fn with_closing_markers(mut self, markers: &[String]) -> Self {
        self.closing_markers = markers.iter().filter(|m| !m.is_empty()).cloned().collect();
        self
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        match self.policy {
            BoundaryPolicy::Prose => self.split_prose(text),
            BoundaryPolicy::Code => self.split_code(text),
        }
    }

    fn split_prose(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < text.len() {
            let rest = &text[start..];
            let window = self.estimator.longest_prefix(rest, self.max_units);

            let cut = if window >= rest.len() {
                rest.len()
            } else if let Some(pos) = rest[..window].rfind(SENTENCE_TERMINATORS) {
                pos + 1
            } else if let Some(pos) = rest[window..].find(SENTENCE_TERMINATORS) {
                // Oversized sentence: keep it whole.
                window + pos + 1
            } else {
                window
            };

            let piece = &rest[..cut];
            chunks.push(self.make_chunk(chunks.len(), piece, start));
            start += cut;
        }

        chunks
    }

    fn split_code(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_start = 0usize;
        let mut offset = 0usize;
        let mut current_units = 0usize;

        for line in text.split_inclusive('\n') {
            let line_units = self.estimator.count(line);

            if offset > chunk_start && current_units + line_units > self.max_units {
                chunks.push(self.make_chunk(chunks.len(), &text[chunk_start..offset], chunk_start));
                chunk_start = offset;
                current_units = 0;
            }

            offset += line.len();
            current_units += line_units;

            let closes = self.closing_markers.iter().any(|m| line.contains(m.as_str()));
            if closes || current_units > self.max_units {
                chunks.push(self.make_chunk(chunks.len(), &text[chunk_start..offset], chunk_start));
                chunk_start = offset;
                current_units = 0;
            }
        }

        if offset > chunk_start {
            chunks.push(self.make_chunk(chunks.len(), &text[chunk_start..offset], chunk_start));
        }

        chunks
    }

    fn make_chunk(&self, index: usize, text: &str, start: usize) -> Chunk {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Chunk {
            index,
            text: text.to_string(),
            units: self.estimator.count(text),
            start,
            end: start + text.len(),
            hash,
        }
    }
}

/// Split `text` with the default closing markers.
pub fn split(
    text: &str,
    max_units: usize,
    policy: BoundaryPolicy,
    estimator: &dyn LengthEstimator,
) -> Vec<Chunk> {
    Splitter::new(max_units, policy, estimator).split(text)
}

/// Concatenate chunk texts in index order.
pub fn rejoin(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);
    ordered.iter().map(|c| c.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::CharEstimator;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_code_closing_brace_example() {
        let doc = "void f() {\n  return;\n}\n";
        let chunks = split(doc, 20, BoundaryPolicy::Code, &CharEstimator);
        assert_eq!(texts(&chunks), vec!["void f() {\n", "  return;\n}\n"]);
        assert_eq!(rejoin(&chunks), doc);
    }

    #[test]
    fn test_code_tiny_bound_keeps_lines_whole() {
        let doc = "void f() {\n  return;\n}\n";
        let chunks = split(doc, 5, BoundaryPolicy::Code, &CharEstimator);
        assert_eq!(texts(&chunks), vec!["void f() {\n", "  return;\n", "}\n"]);
    }

    #[test]
    fn test_code_no_trailing_newline() {
        let doc = "int a;\nint b;";
        let chunks = split(doc, 100, BoundaryPolicy::Code, &CharEstimator);
        assert_eq!(texts(&chunks), vec!["int a;\nint b;"]);
    }

    #[test]
    fn test_code_custom_markers() {
        let doc = "a\nEND\nb\n";
        let chunks = Splitter::new(100, BoundaryPolicy::Code, &CharEstimator)
            .with_closing_markers(&["END".to_string()])
            .split(doc);
        assert_eq!(texts(&chunks), vec!["a\nEND\n", "b\n"]);
    }

    #[test]
    fn test_prose_cuts_at_last_terminator_in_window() {
        let doc = "One two. Three four! Five six seven eight nine ten.";
        let chunks = split(doc, 25, BoundaryPolicy::Prose, &CharEstimator);
        assert_eq!(chunks[0].text, "One two. Three four!");
        assert_eq!(rejoin(&chunks), doc);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with(SENTENCE_TERMINATORS));
        }
    }

    #[test]
    fn test_prose_oversized_sentence_kept_whole() {
        let long = format!("{}.", "word ".repeat(40).trim_end());
        let doc = format!("{} Short one.", long);
        let chunks = split(&doc, 20, BoundaryPolicy::Prose, &CharEstimator);
        assert_eq!(chunks[0].text, long);
        assert_eq!(rejoin(&chunks), doc);
    }

    #[test]
    fn test_prose_hard_cut_without_terminators() {
        let doc = "a".repeat(50);
        let chunks = split(&doc, 20, BoundaryPolicy::Prose, &CharEstimator);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].units, 20);
        assert_eq!(chunks[2].units, 10);
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(split("", 10, BoundaryPolicy::Prose, &CharEstimator).is_empty());
        assert!(split("", 10, BoundaryPolicy::Code, &CharEstimator).is_empty());
    }

    #[test]
    fn test_offsets_and_indices_contiguous() {
        let doc = "First. Second. Third. Fourth. Fifth. Sixth.";
        let chunks = split(doc, 12, BoundaryPolicy::Prose, &CharEstimator);
        let mut expected_start = 0;
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.start, expected_start);
            assert_eq!(&doc[c.start..c.end], c.text);
            expected_start = c.end;
        }
        assert_eq!(expected_start, doc.len());
    }

    #[test]
    fn test_deterministic() {
        let doc = "Alpha. Beta! Gamma? Delta; Epsilon: zeta.\n".repeat(10);
        let a = split(&doc, 30, BoundaryPolicy::Prose, &CharEstimator);
        let b = split(&doc, 30, BoundaryPolicy::Prose, &CharEstimator);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_tracks_text() {
        let chunks = split("a.a.", 2, BoundaryPolicy::Prose, &CharEstimator);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, chunks[1].text);
        assert_eq!(chunks[0].hash, chunks[1].hash);
        assert_eq!(chunks[0].hash.len(), 64);
    }
}
