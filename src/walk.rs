//! Directory planning for `docpass run <dir>`.
//!
//! Walks the input tree once and classifies every file:
//!
//! - **document**: matches the task's include globs; transformed into the
//!   same relative path under the output root (with the task's output
//!   extension, if any). When two documents would land on the same output
//!   (`paper.pdf` and `paper.txt` with extension `txt`), the one whose
//!   extension is replaced keeps it: `paper.pdf.txt`.
//! - **skipped**: a document whose output already exists. Re-running a
//!   directory job resumes where the last run stopped.
//! - **mirrored**: anything else; copied untouched, only when missing.
//!
//! `.git`, `target` and `node_modules` are never visited, nor is the output
//! root when it lies inside the input tree. Results are sorted by relative
//! path so runs are deterministic.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::output::resolve_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Path of `input` relative to the input root.
    pub relative: PathBuf,
}

#[derive(Debug, Default)]
pub struct DirectoryPlan {
    pub documents: Vec<PlannedFile>,
    pub skipped: Vec<PlannedFile>,
    pub mirrored: Vec<PlannedFile>,
}

pub fn plan_directory(
    input_root: &Path,
    output_root: &Path,
    include_globs: &[String],
    output_extension: Option<&str>,
) -> Result<DirectoryPlan> {
    if !input_root.is_dir() {
        bail!("Input directory does not exist: {}", input_root.display());
    }

    let include_set = build_globset(include_globs)?;
    let exclude_set = build_globset(&[
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;
    let resolved_input = resolve_path(input_root)?;
    let resolved_output = resolve_path(output_root)?;

    let mut plan = DirectoryPlan::default();
    let mut targets: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry in WalkDir::new(input_root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(input_root).unwrap_or(path);
        if resolved_input.join(relative).starts_with(&resolved_output) {
            continue;
        }
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        if include_set.is_match(&rel_str) {
            targets.push((path.to_path_buf(), relative.to_path_buf()));
        } else {
            plan.mirrored.push(PlannedFile {
                input: path.to_path_buf(),
                output: output_root.join(relative),
                relative: relative.to_path_buf(),
            });
        }
    }

    let mut claims: HashMap<PathBuf, usize> = HashMap::new();
    for (_, relative) in &targets {
        *claims
            .entry(target_path(relative, output_extension, false))
            .or_default() += 1;
    }

    let mut taken: HashMap<PathBuf, PathBuf> = HashMap::new();
    for (input, relative) in targets {
        let plain = target_path(&relative, output_extension, false);
        let target = if claims.get(&plain).copied().unwrap_or(0) > 1 {
            target_path(&relative, output_extension, true)
        } else {
            plain
        };
        if let Some(other) = taken.insert(target.clone(), input.clone()) {
            bail!(
                "{} and {} would both be written to {}",
                other.display(),
                input.display(),
                output_root.join(&target).display()
            );
        }

        let planned = PlannedFile {
            input,
            output: output_root.join(&target),
            relative,
        };
        if planned.output.exists() {
            plan.skipped.push(planned);
        } else {
            plan.documents.push(planned);
        }
    }

    Ok(plan)
}

/// Output path of a document relative to the output root. With
/// `keep_source_extension`, a replaced extension is kept in front of the
/// new one (`paper.pdf` -> `paper.pdf.txt`).
fn target_path(relative: &Path, output_extension: Option<&str>, keep_source_extension: bool) -> PathBuf {
    let mut target = relative.to_path_buf();
    let Some(ext) = output_extension else {
        return target;
    };
    match relative.extension() {
        Some(current) if current == ext => {}
        Some(current) if keep_source_extension => {
            let mut combined = OsString::from(current);
            combined.push(".");
            combined.push(ext);
            target.set_extension(combined);
        }
        _ => {
            target.set_extension(ext);
        }
    }
    target
}

/// Copy mirrored files that are not yet present. Returns how many were copied.
pub fn copy_mirrored(plan: &DirectoryPlan) -> Result<usize> {
    let mut copied = 0;
    for file in &plan.mirrored {
        if file.output.exists() {
            continue;
        }
        if let Some(parent) = file.output.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        std::fs::copy(&file.input, &file.output).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                file.input.display(),
                file.output.display()
            )
        })?;
        copied += 1;
    }
    Ok(copied)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn globs() -> Vec<String> {
        vec!["**/*.h".to_string()]
    }

    #[test]
    fn test_classifies_documents_and_mirrors() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("src");
        let output = tmp.path().join("src_doxygen");
        write(&input, "b.h", "int b;");
        write(&input, "a.h", "int a;");
        write(&input, "nested/c.h", "int c;");
        write(&input, "nested/impl.cpp", "int main() {}");
        write(&input, ".git/HEAD", "ref");

        let plan = plan_directory(&input, &output, &globs(), None).unwrap();
        let docs: Vec<PathBuf> = plan.documents.iter().map(|d| d.output.clone()).collect();
        assert_eq!(
            docs,
            vec![
                output.join("a.h"),
                output.join("b.h"),
                output.join("nested/c.h")
            ]
        );
        assert_eq!(plan.mirrored.len(), 1);
        assert_eq!(plan.mirrored[0].output, output.join("nested/impl.cpp"));
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_existing_outputs_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("src");
        let output = tmp.path().join("out");
        write(&input, "a.h", "int a;");
        write(&input, "b.h", "int b;");
        write(&output, "a.h", "done");

        let plan = plan_directory(&input, &output, &globs(), None).unwrap();
        assert_eq!(plan.documents.len(), 1);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].input, input.join("a.h"));
    }

    #[test]
    fn test_output_extension_applied() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("papers");
        write(&input, "p1.pdf", "%PDF");
        let output = tmp.path().join("papers_cleaned");

        let plan =
            plan_directory(&input, &output, &["**/*.pdf".to_string()], Some("txt")).unwrap();
        assert_eq!(plan.documents[0].output, output.join("p1.txt"));
    }

    #[test]
    fn test_output_root_inside_input_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().to_path_buf();
        let output = input.join("out");
        write(&input, "a.h", "int a;");
        write(&output, "stale.h", "x");

        let plan = plan_directory(&input, &output, &globs(), None).unwrap();
        assert_eq!(plan.documents.len(), 1);
        assert!(plan.mirrored.is_empty());
    }

    #[test]
    fn test_relative_output_root_inside_canonical_input_is_ignored() {
        // Created under the working directory so the path is relative.
        let tmp = tempfile::tempdir_in(".").unwrap();
        assert!(tmp.path().is_relative());
        let input = tmp.path().join("src");
        let output = input.join("out");
        write(&input, "a.h", "int a;");
        write(&output, "a.h", "done");
        write(&output, "notes.md", "x");

        let canonical = input.canonicalize().unwrap();
        let plan = plan_directory(&canonical, &output, &globs(), None).unwrap();
        assert_eq!(plan.skipped.len(), 1);
        assert!(plan.documents.is_empty());
        assert!(plan.mirrored.is_empty());
    }

    #[test]
    fn test_colliding_outputs_keep_source_extension() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("papers");
        let output = tmp.path().join("papers_cleaned");
        write(&input, "paper.pdf", "%PDF");
        write(&input, "paper.txt", "text");
        write(&input, "other.pdf", "%PDF");

        let globs = vec!["**/*.pdf".to_string(), "**/*.txt".to_string()];
        let plan = plan_directory(&input, &output, &globs, Some("txt")).unwrap();
        let outputs: Vec<PathBuf> = plan.documents.iter().map(|d| d.output.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                output.join("other.txt"),
                output.join("paper.pdf.txt"),
                output.join("paper.txt")
            ]
        );
    }

    #[test]
    fn test_unresolvable_collision_fails() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("papers");
        write(&input, "paper.pdf", "%PDF");
        write(&input, "paper.pdf.txt", "text");
        write(&input, "paper.txt", "text");

        let globs = vec!["**/*.pdf".to_string(), "**/*.txt".to_string()];
        let err = plan_directory(&input, &tmp.path().join("out"), &globs, Some("txt"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("would both be written"), "{}", err);
    }

    #[test]
    fn test_copy_mirrored_only_when_missing() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("src");
        let output = tmp.path().join("out");
        write(&input, "notes.md", "new");
        write(&input, "keep.md", "new");
        write(&output, "keep.md", "edited");

        let plan = plan_directory(&input, &output, &globs(), None).unwrap();
        assert_eq!(copy_mirrored(&plan).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(output.join("notes.md")).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(output.join("keep.md")).unwrap(), "edited");
    }

    #[test]
    fn test_missing_root_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(plan_directory(&missing, &tmp.path().join("out"), &globs(), None).is_err());
    }
}
