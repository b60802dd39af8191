//! Document-level pipeline.
//!
//! `process` splits a document, runs the continuation controller for each
//! chunk strictly in index order, reassembles the chunk outputs, strips
//! code-fence lines the service tends to add, and writes the result exactly
//! once. If any chunk fails, the document aborts and nothing is written; an
//! existing output file is left untouched.
//!
//! With `output.debug_dir` set, every chunk leaves a trail under
//! `<debug_dir>/<document name>/`, the name being the file name for a single
//! file and the path relative to the input root in a directory run:
//!
//! ```text
//! chunk_001_before.txt        raw chunk text
//! chunk_001_fragment_01.txt   each sentinel-free reply
//! chunk_001_after.txt         reassembled chunk output
//! manifest.json               byte ranges, units, sha256, status per chunk
//! ```

use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chunk::Splitter;
use crate::config::Config;
use crate::continuation::{self, assemble, join_pieces, CancelFlag, ContinuationSettings, RunOutcome};
use crate::conversation::Conversation;
use crate::extract::load_document;
use crate::models::{Chunk, ChunkOutput, ChunkStatus, Document, Fragment};
use crate::output::write_atomic;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::tasks::TaskProfile;
use crate::tokenize::LengthEstimator;
use crate::transform::{TransformClient, TransformError};
use crate::walk::DirectoryPlan;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("chunk {} of {total} failed: {source}", .index + 1)]
    ChunkFailed {
        index: usize,
        total: usize,
        #[source]
        source: TransformError,
    },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl DocumentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DocumentError::ChunkFailed {
                source: TransformError::Cancelled,
                ..
            }
        )
    }
}

/// Everything a document run needs, built once per process.
pub struct RunContext<'a> {
    pub task: TaskProfile,
    pub settings: ContinuationSettings,
    pub closing_markers: Vec<String>,
    pub debug_dir: Option<PathBuf>,
    pub client: &'a dyn TransformClient,
    pub estimator: &'a dyn LengthEstimator,
    pub progress: &'a dyn ProgressReporter,
    pub cancel: CancelFlag,
}

impl<'a> RunContext<'a> {
    pub fn from_config(
        config: &Config,
        client: &'a dyn TransformClient,
        estimator: &'a dyn LengthEstimator,
        progress: &'a dyn ProgressReporter,
        cancel: CancelFlag,
    ) -> anyhow::Result<Self> {
        let task = config.task_profile()?;
        let settings = ContinuationSettings {
            max_continuations: config.continuation.max_continuations,
            continue_prompt: task.continue_prompt(&config.continuation.sentinel),
            sentinel: config.continuation.sentinel.clone(),
            call_timeout: config.call_timeout(),
        };
        Ok(Self {
            task,
            settings,
            closing_markers: config.chunking.closing_markers.clone(),
            debug_dir: config.output.debug_dir.clone(),
            client,
            estimator,
            progress,
            cancel,
        })
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        Splitter::new(self.task.max_units, self.task.policy, self.estimator)
            .with_closing_markers(&self.closing_markers)
            .split(text)
    }
}

/// Reassembled output of a document, not yet written.
#[derive(Debug)]
pub struct TransformedDocument {
    pub text: String,
    pub chunks: Vec<ChunkOutput>,
}

impl TransformedDocument {
    pub fn incomplete_chunks(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Incomplete)
            .map(|c| c.index)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub chunks: usize,
    /// 0-based indices of chunks that hit the continuation cap.
    pub incomplete_chunks: Vec<usize>,
    pub fragments: usize,
}

/// Transform every chunk of `document` without writing the final output.
pub async fn transform_document(
    document: &Document,
    ctx: &RunContext<'_>,
) -> Result<TransformedDocument, DocumentError> {
    let chunks = ctx.split(&document.text);
    let total = chunks.len();
    ctx.progress.report(ProgressEvent::DocumentStarted {
        path: document.source.clone(),
        chunks: total,
    });

    let debug = ctx
        .debug_dir
        .as_ref()
        .map(|dir| DebugSink::new(dir, &document.name));
    let system = ctx.task.system_prompt(&ctx.settings.sentinel);
    let mut outputs: Vec<ChunkOutput> = Vec::with_capacity(total);
    let mut manifest: Vec<ManifestEntry> = Vec::with_capacity(total);

    for chunk in &chunks {
        if ctx.cancel.is_cancelled() {
            return Err(DocumentError::ChunkFailed {
                index: chunk.index,
                total,
                source: TransformError::Cancelled,
            });
        }

        ctx.progress.report(ProgressEvent::ChunkStarted {
            index: chunk.index,
            total,
            units: chunk.units,
        });
        if let Some(sink) = &debug {
            sink.write(ctx, &format!("chunk_{:03}_before.txt", chunk.index + 1), &chunk.text);
        }

        let conversation = Conversation::new(system.clone(), ctx.task.user_prompt(&chunk.text));
        let max = ctx.settings.max_continuations;
        let outcome = continuation::run(
            ctx.client,
            conversation,
            &ctx.settings,
            &ctx.cancel,
            |round| {
                ctx.progress.report(ProgressEvent::Continuation {
                    chunk: chunk.index,
                    round,
                    max,
                })
            },
        )
        .await;

        let (fragments, status) = match outcome {
            RunOutcome::Complete(fragments) => (fragments, ChunkStatus::Complete),
            RunOutcome::Incomplete(fragments) => {
                ctx.progress.report(ProgressEvent::Warning {
                    message: format!(
                        "{}: chunk {} of {} still incomplete after {} continuations; keeping partial output",
                        document.source.display(),
                        chunk.index + 1,
                        total,
                        max
                    ),
                });
                (fragments, ChunkStatus::Incomplete)
            }
            RunOutcome::Failed(source) => {
                manifest.push(ManifestEntry::new(chunk, "failed", 0));
                if let Some(sink) = &debug {
                    sink.write_manifest(ctx, document, &manifest);
                }
                return Err(DocumentError::ChunkFailed {
                    index: chunk.index,
                    total,
                    source,
                });
            }
        };

        let text = assemble(&fragments, &ctx.settings.sentinel);
        if let Some(sink) = &debug {
            sink.write_fragments(ctx, chunk.index, &fragments);
            sink.write(ctx, &format!("chunk_{:03}_after.txt", chunk.index + 1), &text);
        }

        manifest.push(ManifestEntry::new(chunk, status.as_str(), fragments.len()));
        ctx.progress.report(ProgressEvent::ChunkFinished {
            index: chunk.index,
            total,
            status,
        });
        outputs.push(ChunkOutput {
            index: chunk.index,
            text,
            status,
            fragments: fragments.len(),
        });
    }

    if let Some(sink) = &debug {
        sink.write_manifest(ctx, document, &manifest);
    }

    let joined = join_pieces(outputs.iter().map(|o| o.text.as_str()));
    Ok(TransformedDocument {
        text: strip_fence_lines(&joined),
        chunks: outputs,
    })
}

/// Transform `document` and write it to `output`, only if every chunk
/// succeeded.
pub async fn process(
    document: &Document,
    output: &Path,
    ctx: &RunContext<'_>,
) -> Result<DocumentReport, DocumentError> {
    let result = match transform_document(document, ctx).await {
        Ok(transformed) => write_atomic(output, &transformed.text)
            .map(|_| transformed)
            .map_err(DocumentError::from),
        Err(e) => Err(e),
    };

    ctx.progress.report(ProgressEvent::DocumentFinished {
        path: document.source.clone(),
        output: result.as_ref().ok().map(|_| output.to_path_buf()),
        ok: result.is_ok(),
    });

    let transformed = result?;
    Ok(DocumentReport {
        source: document.source.clone(),
        output: output.to_path_buf(),
        chunks: transformed.chunks.len(),
        incomplete_chunks: transformed.incomplete_chunks(),
        fragments: transformed.chunks.iter().map(|c| c.fragments).sum(),
    })
}

/// Load `input` (extracting PDFs) and [`process`] it.
pub async fn process_path(
    input: &Path,
    output: &Path,
    ctx: &RunContext<'_>,
) -> Result<DocumentReport, DocumentError> {
    let document = load_document(input)?;
    process(&document, output, ctx).await
}

/// Outcome of a multi-document run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<DocumentReport>,
    pub failures: Vec<(PathBuf, String)>,
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Process every planned document in order. A failed document does not
/// stop its siblings; cancellation stops the whole run.
pub async fn process_plan(plan: &DirectoryPlan, ctx: &RunContext<'_>) -> RunSummary {
    let mut summary = RunSummary {
        skipped: plan.skipped.len(),
        ..Default::default()
    };

    for skipped in &plan.skipped {
        ctx.progress.report(ProgressEvent::Warning {
            message: format!(
                "skipping {}: {} already exists",
                skipped.input.display(),
                skipped.output.display()
            ),
        });
    }

    for planned in &plan.documents {
        if ctx.cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let result = match load_document(&planned.input) {
            Ok(document) => {
                let document = document.with_name(&planned.relative);
                process(&document, &planned.output, ctx).await
            }
            Err(e) => Err(DocumentError::from(e)),
        };
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                if e.is_cancelled() {
                    summary.cancelled = true;
                }
                summary
                    .failures
                    .push((planned.input.clone(), format!("{:#}", anyhow::Error::new(e))));
            }
        }
    }

    summary
}

/// Drop lines that consist only of a Markdown code fence, with or without a
/// language tag.
pub fn strip_fence_lines(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !is_fence_line(line))
        .collect()
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    match trimmed.strip_prefix("```") {
        Some(tag) => tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '#')),
        None => false,
    }
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    chunk: usize,
    start: usize,
    end: usize,
    units: usize,
    sha256: String,
    status: &'static str,
    fragments: usize,
}

impl ManifestEntry {
    fn new(chunk: &Chunk, status: &'static str, fragments: usize) -> Self {
        Self {
            chunk: chunk.index + 1,
            start: chunk.start,
            end: chunk.end,
            units: chunk.units,
            sha256: chunk.hash.clone(),
            status,
            fragments,
        }
    }
}

/// Writes debug artifacts. Failures are reported as warnings and never
/// abort the document.
struct DebugSink {
    dir: PathBuf,
}

impl DebugSink {
    fn new(debug_dir: &Path, name: &Path) -> Self {
        Self {
            dir: debug_dir.join(name),
        }
    }

    fn write(&self, ctx: &RunContext<'_>, name: &str, contents: &str) {
        let path = self.dir.join(name);
        let result = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, contents))
            .with_context(|| format!("Failed to write debug file {}", path.display()));
        if let Err(e) = result {
            ctx.progress.report(ProgressEvent::Warning {
                message: format!("{:#}", e),
            });
        }
    }

    fn write_fragments(&self, ctx: &RunContext<'_>, index: usize, fragments: &[Fragment]) {
        for (i, fragment) in fragments.iter().enumerate() {
            self.write(
                ctx,
                &format!("chunk_{:03}_fragment_{:02}.txt", index + 1, i + 1),
                &fragment.text,
            );
        }
    }

    fn write_manifest(&self, ctx: &RunContext<'_>, document: &Document, entries: &[ManifestEntry]) {
        let manifest = serde_json::json!({
            "source": document.source.display().to_string(),
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "task": ctx.task.name,
            "max_units": ctx.task.max_units,
            "unit": ctx.estimator.unit().as_str(),
            "chunks": entries,
        });
        match serde_json::to_string_pretty(&manifest) {
            Ok(body) => self.write(ctx, "manifest.json", &body),
            Err(e) => ctx.progress.report(ProgressEvent::Warning {
                message: format!("Failed to encode debug manifest: {}", e),
            }),
        }
    }
}
