//! Run progress reporting.
//!
//! Reports observable progress during `docpass run` so users see which
//! document is being processed, which chunk is in flight, and when the
//! service needed continuation rounds. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::path::PathBuf;

use crate::models::ChunkStatus;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A document was split and is about to be sent.
    DocumentStarted { path: PathBuf, chunks: usize },
    /// Chunk `index` (0-based) of `total` is being sent.
    ChunkStarted {
        index: usize,
        total: usize,
        units: usize,
    },
    /// The service signalled an incomplete reply; continuation round `round`.
    Continuation {
        chunk: usize,
        round: u32,
        max: u32,
    },
    ChunkFinished {
        index: usize,
        total: usize,
        status: ChunkStatus,
    },
    /// Something worth telling the user that does not stop the run.
    Warning { message: String },
    DocumentFinished {
        path: PathBuf,
        output: Option<PathBuf>,
        ok: bool,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "chunk 3 / 12  1,834 units".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::DocumentStarted { path, chunks } => {
                format!("document {}  {} chunks\n", path.display(), format_number(*chunks as u64))
            }
            ProgressEvent::ChunkStarted {
                index,
                total,
                units,
            } => format!(
                "  chunk {} / {}  {} units\n",
                index + 1,
                total,
                format_number(*units as u64)
            ),
            ProgressEvent::Continuation { chunk, round, max } => {
                format!("  chunk {}  continuation {} / {}\n", chunk + 1, round, max)
            }
            ProgressEvent::ChunkFinished {
                index,
                total,
                status,
            } => format!("  chunk {} / {}  {}\n", index + 1, total, status.as_str()),
            ProgressEvent::Warning { message } => format!("warning: {}\n", message),
            ProgressEvent::DocumentFinished { path, output, ok } => match (ok, output) {
                (true, Some(out)) => format!("document {}  done -> {}\n", path.display(), out.display()),
                (true, None) => format!("document {}  done\n", path.display()),
                (false, _) => format!("document {}  failed, nothing written\n", path.display()),
            },
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &ProgressEvent) -> serde_json::Value {
        match event {
            ProgressEvent::DocumentStarted { path, chunks } => serde_json::json!({
                "event": "document_started",
                "path": path.display().to_string(),
                "chunks": chunks
            }),
            ProgressEvent::ChunkStarted {
                index,
                total,
                units,
            } => serde_json::json!({
                "event": "chunk_started",
                "n": index + 1,
                "total": total,
                "units": units
            }),
            ProgressEvent::Continuation { chunk, round, max } => serde_json::json!({
                "event": "continuation",
                "chunk": chunk + 1,
                "round": round,
                "max": max
            }),
            ProgressEvent::ChunkFinished {
                index,
                total,
                status,
            } => serde_json::json!({
                "event": "chunk_finished",
                "n": index + 1,
                "total": total,
                "status": status.as_str()
            }),
            ProgressEvent::Warning { message } => serde_json::json!({
                "event": "warning",
                "message": message
            }),
            ProgressEvent::DocumentFinished { path, output, ok } => serde_json::json!({
                "event": "document_finished",
                "path": path.display().to_string(),
                "output": output.as_ref().map(|p| p.display().to_string()),
                "ok": ok
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = Self::to_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_are_one_based() {
        let obj = JsonProgress::to_json(&ProgressEvent::ChunkStarted {
            index: 0,
            total: 3,
            units: 42,
        });
        assert_eq!(obj["event"], "chunk_started");
        assert_eq!(obj["n"], 1);
        assert_eq!(obj["total"], 3);

        let obj = JsonProgress::to_json(&ProgressEvent::ChunkFinished {
            index: 2,
            total: 3,
            status: ChunkStatus::Incomplete,
        });
        assert_eq!(obj["status"], "incomplete");
    }

    #[test]
    fn json_document_finished_without_output() {
        let obj = JsonProgress::to_json(&ProgressEvent::DocumentFinished {
            path: PathBuf::from("a.h"),
            output: None,
            ok: false,
        });
        assert!(obj["output"].is_null());
        assert_eq!(obj["ok"], false);
    }
}
