//! Directory-wide aggregation: collect inputs, extract each, concatenate.

use crate::table::Table;
use anyhow::{Result, bail};
use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What to do when one input file fails to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Stop and return the first failure.
    #[default]
    Abort,
    /// Log the failure and carry on with the next file.
    Skip,
}

/// All regular files below `root`, sorted by path.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    Ok(files)
}

/// Removes the first path containing `needle` and returns it.
pub fn take_reference_file(files: &mut Vec<PathBuf>, needle: &str) -> Result<PathBuf> {
    match files
        .iter()
        .position(|p| p.to_string_lossy().contains(needle))
    {
        Some(idx) => Ok(files.remove(idx)),
        None => bail!("reference file '{needle}' not found in the directory"),
    }
}

fn progress_bar_for_count(count: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(count as u64).with_style(style)
}

/// Applies `extract` to every file in `files` and concatenates the results.
pub fn aggregate_files<F>(files: &[PathBuf], on_error: OnError, mut extract: F) -> Result<Table>
where
    F: FnMut(&Path) -> Result<Table>,
{
    let mut tables = Vec::with_capacity(files.len());
    let mut failed = 0usize;

    for path in files.iter().progress_with(progress_bar_for_count(files.len())) {
        match extract(path) {
            Ok(table) => tables.push(table),
            Err(e) if on_error == OnError::Skip => {
                failed += 1;
                error!(path = %path.display(), error = ?e, "Extraction failed, skipping file");
            }
            Err(e) => return Err(e),
        }
    }

    let combined = Table::concat(tables);
    info!(files = files.len(), failed, rows = combined.len(), "Aggregation complete");
    Ok(combined)
}

/// Walks `root`, drops the reference file matched by `exclude` (if any) and
/// aggregates every remaining file with `extract`.
pub fn aggregate_directory<F>(
    root: &Path,
    exclude: Option<&str>,
    on_error: OnError,
    extract: F,
) -> Result<Table>
where
    F: FnMut(&Path) -> Result<Table>,
{
    let mut files = collect_files(root)?;
    if let Some(needle) = exclude {
        let reference = take_reference_file(&mut files, needle)?;
        info!(reference = %reference.display(), "Reference file excluded");
    }
    info!(root = %root.display(), files = files.len(), "Collected input files");
    aggregate_files(&files, on_error, extract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;
    use std::fs;

    fn rows(n: usize) -> Table {
        let mut t = Table::new(["n"]);
        for i in 0..n {
            t.push_row(vec![i.into()]);
        }
        t
    }

    #[test]
    fn test_reference_file_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/b.txt"), "22").unwrap();
        fs::write(dir.path().join("NC - Location Coordinates.xlsx"), "").unwrap();

        let mut seen = Vec::new();
        let combined = aggregate_directory(dir.path(), Some("Location Coordinates"), OnError::Abort, |p| {
            seen.push(p.to_path_buf());
            Ok(rows(fs::read_to_string(p)?.len()))
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| !p.to_string_lossy().contains("Location")));
        assert_eq!(combined.len(), 3);
    }

    #[test]
    fn test_missing_reference_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();

        let result = aggregate_directory(dir.path(), Some("Coordinates"), OnError::Abort, |_| Ok(rows(1)));
        assert!(result.is_err());
    }

    #[test]
    fn test_abort_stops_at_first_failure() {
        let files = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let mut calls = 0;
        let result = aggregate_files(&files, OnError::Abort, |p| {
            calls += 1;
            if p == Path::new("b") {
                anyhow::bail!("broken");
            }
            Ok(rows(1))
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_skip_continues_past_failures() {
        let files = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let combined = aggregate_files(&files, OnError::Skip, |p| {
            if p == Path::new("b") {
                anyhow::bail!("broken");
            }
            Ok(rows(2))
        })
        .unwrap();
        assert_eq!(combined.len(), 4);
        assert_eq!(combined.get(3, "n"), Some(&Cell::Number(1.0)));
    }

    #[test]
    fn test_collect_files_rejects_non_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(collect_files(file.path()).is_err());
    }
}
