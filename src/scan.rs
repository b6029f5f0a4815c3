//! Input directory scanning for the embedding pipelines.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A text file read from an input directory.
#[derive(Debug, Clone)]
pub struct TextFile {
    pub path: PathBuf,
    /// File name without directory, e.g. `notes_chunk_001.txt`.
    pub name: String,
    pub text: String,
}

/// Paths of the files directly inside `dir` whose name matches `pattern`,
/// sorted by file name. Subdirectories are not descended into.
pub fn list_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Input directory does not exist: {}", dir.display());
    }
    let matcher = build_matcher(pattern)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            paths.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Read every matching file. Unreadable files are logged and skipped.
pub fn read_text_files(dir: &Path, pattern: &str) -> Result<Vec<TextFile>> {
    let mut files = Vec::new();
    for path in list_files(dir, pattern)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match std::fs::read_to_string(&path) {
            Ok(text) => files.push(TextFile { path, name, text }),
            Err(e) => tracing::error!("Error reading {}: {}", path.display(), e),
        }
    }
    Ok(files)
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("Invalid file pattern: {}", pattern))?
        .compile_matcher())
}
