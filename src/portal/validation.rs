use anyhow::{Result, bail};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Answers whether a download target is already present.
pub trait ExistingFileValidator: Send + Sync {
    fn is_existing_file(&self, file_path: &Path) -> bool;
}

/// Validator backed by a snapshot of one directory's entries, taken when the
/// validator is built. Files written afterwards are not seen.
#[derive(Debug, Clone)]
pub struct LocalStorageValidator {
    contained_files: HashSet<PathBuf>,
}

impl LocalStorageValidator {
    pub fn new(base_directory: &Path) -> Result<Self> {
        if !base_directory.exists() {
            bail!("{} does not exist", base_directory.display());
        }
        if !base_directory.is_dir() {
            bail!("{} is not a directory", base_directory.display());
        }

        let contained_files = std::fs::read_dir(base_directory)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<HashSet<_>>>()?;

        Ok(Self { contained_files })
    }

    pub fn len(&self) -> usize {
        self.contained_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contained_files.is_empty()
    }
}

impl ExistingFileValidator for LocalStorageValidator {
    fn is_existing_file(&self, file_path: &Path) -> bool {
        self.contained_files.contains(file_path)
    }
}
