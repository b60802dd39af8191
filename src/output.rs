//! Output path derivation and atomic writes.
//!
//! | Input | Suffix | Extension | Output |
//! |-------|--------|-----------|--------|
//! | `foo.h` | `_doxygen` | | `foo_doxygen.h` |
//! | `paper.pdf` | `_cleaned` | `txt` | `paper_cleaned.txt` |
//! | `README` | `_doxygen` | | `README_doxygen` |
//! | `src/` (dir) | `_doxygen` | | `src_doxygen/` |

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output path for a single input file: `suffix` goes before the extension,
/// and `extension` (if given) replaces the input's.
pub fn derive_output_path(input: &Path, suffix: &str, extension: Option<&str>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = extension
        .map(|e| e.to_string())
        .or_else(|| input.extension().map(|e| e.to_string_lossy().to_string()));

    let name = match ext {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

/// Output root for a directory input: a sibling named `<dir><suffix>`.
pub fn derive_output_root(input_dir: &Path, suffix: &str) -> PathBuf {
    let trimmed: PathBuf = input_dir.components().collect();
    let name = trimmed
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    trimmed.with_file_name(format!("{}{}", name, suffix))
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
///
/// The longest existing ancestor is canonicalized and the missing tail is
/// appended, so a relative `-o out` and a canonicalized input root can be
/// compared with `Path::starts_with`.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }

    let mut resolved = existing
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", existing.display()))?;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Write `contents` to `path` via a temp file in the same directory renamed
/// into place, so a reader never observes a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move output into place: {}", path.display()))?;
    Ok(())
}
