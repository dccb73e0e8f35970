use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{0} already exists")]
    AlreadyExists(PathBuf),

    #[error("Source directory does not exist or is not a directory: {0}")]
    SourceNotFound(PathBuf),

    #[error("Invalid archive root name: {0:?}")]
    InvalidRootName(String),

    #[error("Invalid archive target path: {0}")]
    InvalidTarget(PathBuf),

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ArchiveError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What to pack, where to, and under which top-level directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSpec {
    pub source_dir: PathBuf,
    pub target_path: PathBuf,
    pub root_name: String,
}

impl ArchiveSpec {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
        root_name: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_path: target_path.into(),
            root_name: root_name.into(),
        }
    }
}

/// Version-control metadata never goes into a source archive
fn is_vcs_metadata(entry: &DirEntry) -> bool {
    entry.depth() > 0 && matches!(entry.file_name().to_str(), Some(".git") | Some(".gitignore"))
}

/// Packs `spec.source_dir` into a gzip-compressed tar at `spec.target_path`.
///
/// Every member lives under `spec.root_name/`. The archive is assembled in a temporary file
/// next to the target and moved into place only if the target still does not exist, so an
/// existing file is never replaced and an interrupted run leaves no partial archive behind.
pub fn pack(spec: &ArchiveSpec) -> Result<PathBuf, ArchiveError> {
    if fs::symlink_metadata(&spec.target_path).is_ok() {
        return Err(ArchiveError::AlreadyExists(spec.target_path.clone()));
    }

    let root_name = spec.root_name.as_str();
    if root_name.is_empty() || root_name == "." || root_name == ".." || root_name.contains('/') {
        return Err(ArchiveError::InvalidRootName(spec.root_name.clone()));
    }

    if !spec.source_dir.is_dir() {
        return Err(ArchiveError::SourceNotFound(spec.source_dir.clone()));
    }
    let source_dir = spec
        .source_dir
        .canonicalize()
        .map_err(ArchiveError::io(&spec.source_dir))?;

    let file_name = spec
        .target_path
        .file_name()
        .ok_or_else(|| ArchiveError::InvalidTarget(spec.target_path.clone()))?;
    let target_dir = match spec.target_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let target_dir = target_dir
        .canonicalize()
        .map_err(ArchiveError::io(target_dir))?;
    let target = target_dir.join(file_name);

    debug!(
        source = %source_dir.display(),
        root = root_name,
        target = %target.display(),
        "Packing sources"
    );

    let mut staging = tempfile::Builder::new()
        .prefix(".rpkg-")
        .suffix(".part")
        .tempfile_in(&target_dir)
        .map_err(ArchiveError::io(&target_dir))?;
    let skip = [target.clone(), staging.path().to_path_buf()];

    let encoder = GzEncoder::new(staging.as_file_mut(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let walker = WalkDir::new(&source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let excluded = is_vcs_metadata(entry);
            if excluded {
                debug!(path = %entry.path().display(), "Excluding");
            }
            !excluded
        });

    let mut members = 0usize;
    for entry in walker {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: source_dir.clone(),
            source,
        })?;
        let path = entry.path();
        if skip.iter().any(|s| s == path) {
            continue;
        }

        let relative = path
            .strip_prefix(&source_dir)
            .map_err(|_| ArchiveError::InvalidTarget(path.to_path_buf()))?;
        let member = if relative.as_os_str().is_empty() {
            PathBuf::from(root_name)
        } else {
            Path::new(root_name).join(relative)
        };

        trace!(member = %member.display(), "Adding");
        builder
            .append_path_with_name(path, &member)
            .map_err(ArchiveError::io(path))?;
        members += 1;
    }

    let encoder = builder.into_inner().map_err(ArchiveError::io(&target))?;
    encoder.finish().map_err(ArchiveError::io(&target))?;

    staging
        .persist_noclobber(&target)
        .map_err(|e| match e.error.kind() {
            io::ErrorKind::AlreadyExists => ArchiveError::AlreadyExists(spec.target_path.clone()),
            _ => ArchiveError::Io {
                path: target.clone(),
                source: e.error,
            },
        })?;

    debug!(members, target = %target.display(), "Archive written");
    Ok(spec.target_path.clone())
}
