use anyhow::Result;
use std::path::{Path, PathBuf};

/// One direct child of a listed directory
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
}

impl DirEntry {
    /// Builds an entry whose name is the last component of `path`
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    /// A `*.spec` name; whether it is a regular file is up to the caller
    pub fn is_spec(&self) -> bool {
        self.name.ends_with(".spec")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }
}

/// Read-only view of the package working directory
pub trait FileSystem: Send + Sync {
    /// Check if path is a regular file (symlinks are followed)
    fn is_file(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// List the direct children of a directory
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;
}
