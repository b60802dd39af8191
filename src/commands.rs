//! Command implementations behind the `docpass` binary.
//!
//! Each function prints a short summary on stdout (ending in `ok` on
//! success) and leaves progress lines to the reporter on stderr.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::chunk::{rejoin, Splitter};
use crate::config::Config;
use crate::continuation::CancelFlag;
use crate::extract::{load_document, pdf_to_text};
use crate::orchestrate::{process_path, process_plan, RunContext, RunSummary};
use crate::output::{derive_output_path, derive_output_root, write_atomic};
use crate::progress::ProgressReporter;
use crate::tasks;
use crate::tokenize::create_estimator;
use crate::transform::create_client;
use crate::walk::{copy_mirrored, plan_directory};

/// `docpass run`: transform one file, or every eligible file under a
/// directory.
pub async fn run_documents(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    progress: &dyn ProgressReporter,
    cancel: CancelFlag,
) -> Result<()> {
    let task = config.task_profile()?;
    let estimator = create_estimator(task.unit, &config.model.name)?;
    let client = create_client(config)?;
    let ctx = RunContext::from_config(config, client.as_ref(), estimator.as_ref(), progress, cancel)?;

    let summary = if input.is_dir() {
        let root = input
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", input.display()))?;
        let output_root = output.unwrap_or_else(|| derive_output_root(&root, &task.output_suffix));
        let plan = plan_directory(
            &root,
            &output_root,
            &task.include_globs,
            task.output_extension.as_deref(),
        )?;
        let copied = copy_mirrored(&plan)?;

        println!("run {} -> {}", root.display(), output_root.display());
        println!("  documents: {}", plan.documents.len());
        println!("  skipped (output exists): {}", plan.skipped.len());
        println!("  mirrored files copied: {}", copied);

        process_plan(&plan, &ctx).await
    } else if input.is_file() {
        let output = output.unwrap_or_else(|| {
            derive_output_path(input, &task.output_suffix, task.output_extension.as_deref())
        });
        println!("run {} -> {}", input.display(), output.display());

        let mut summary = RunSummary::default();
        match process_path(input, &output, &ctx).await {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                summary.cancelled = e.is_cancelled();
                summary
                    .failures
                    .push((input.to_path_buf(), format!("{:#}", anyhow::Error::new(e))));
            }
        }
        summary
    } else {
        bail!("Input does not exist: {}", input.display());
    };

    print_summary(&summary);

    if summary.cancelled {
        bail!("interrupted");
    }
    if !summary.failures.is_empty() {
        bail!("{} document(s) failed", summary.failures.len());
    }
    println!("ok");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        println!(
            "  wrote {} ({} chunks, {} replies)",
            report.output.display(),
            report.chunks,
            report.fragments
        );
        if !report.incomplete_chunks.is_empty() {
            let list: Vec<String> = report
                .incomplete_chunks
                .iter()
                .map(|i| (i + 1).to_string())
                .collect();
            println!("    incomplete chunks: {}", list.join(", "));
        }
    }
    for (path, error) in &summary.failures {
        println!("  failed {}: {}", path.display(), error);
    }
}

/// `docpass split`: show chunk boundaries without calling any service.
pub fn run_split(config: &Config, input: &Path, check: bool) -> Result<()> {
    let task = config.task_profile()?;
    let estimator = create_estimator(task.unit, &config.model.name)?;
    let document = load_document(input)?;

    let chunks = Splitter::new(task.max_units, task.policy, estimator.as_ref())
        .with_closing_markers(&config.chunking.closing_markers)
        .split(&document.text);

    println!(
        "split {}  policy={} max={} {}",
        input.display(),
        task.policy.as_str(),
        task.max_units,
        task.unit.as_str()
    );
    for chunk in &chunks {
        let first_line = chunk.text.lines().next().unwrap_or_default();
        let preview: String = first_line.chars().take(60).collect();
        let oversized = if chunk.units > task.max_units {
            "  (oversized)"
        } else {
            ""
        };
        println!(
            "  #{:<4} {:>7} {}  bytes {}..{}  {}{}",
            chunk.index + 1,
            chunk.units,
            task.unit.as_str(),
            chunk.start,
            chunk.end,
            preview,
            oversized
        );
    }
    println!("  chunks: {}", chunks.len());

    if check {
        if rejoin(&chunks) != document.text {
            bail!("rejoined chunks do not reproduce {}", input.display());
        }
        println!("  rejoin check: passed");
    }
    println!("ok");
    Ok(())
}

/// `docpass extract`: PDF to plain text only.
pub fn run_extract(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let text = pdf_to_text(&bytes).with_context(|| format!("Failed to extract {}", input.display()))?;
    let output = output.unwrap_or_else(|| input.with_extension("txt"));
    write_atomic(&output, &text)?;

    println!("extract {} -> {}", input.display(), output.display());
    println!("  characters: {}", text.chars().count());
    println!("ok");
    Ok(())
}

/// `docpass tasks`: list built-in tasks and their defaults.
pub fn list_tasks() {
    println!(
        "{:<12} {:<7} {:<7} {:>7} {:<12} {:<10} FILES",
        "TASK", "POLICY", "UNIT", "MAX", "PROTOCOL", "SUFFIX"
    );
    for task in tasks::builtin() {
        println!(
            "{:<12} {:<7} {:<7} {:>7} {:<12} {:<10} {}",
            task.name,
            task.policy.as_str(),
            task.unit.as_str(),
            task.max_units,
            task.protocol.as_str(),
            task.output_suffix,
            task.include_globs.join(" ")
        );
        println!("  {}", task.description);
    }
}
