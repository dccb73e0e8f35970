use super::{DirEntry, FileSystem};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Reads the host file system directly
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RealFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read file {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let entries =
            fs::read_dir(path).with_context(|| format!("Failed to read directory {:?}", path))?;

        let mut result = entries
            .map(|entry| {
                let entry = entry.context("Failed to read directory entry")?;
                Ok(DirEntry::new(entry.path()))
            })
            .collect::<Result<Vec<_>>>()?;

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}
