use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, trace};

use crate::fs::FileSystem;
use crate::spec::SourceReference;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Failed to list {path}: {cause:#}")]
    ReadDir { path: PathBuf, cause: anyhow::Error },
}

/// What a package directory holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Declared sources are already present, or nothing worth archiving is left
    Packed,
    /// Real project files that have not been turned into Source0 yet
    Unpacked,
}

impl ContentKind {
    pub fn is_packed(self) -> bool {
        self == ContentKind::Packed
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Packed => f.write_str("packed"),
            ContentKind::Unpacked => f.write_str("unpacked"),
        }
    }
}

fn ignore_regex() -> &'static Regex {
    static IGNORE: OnceLock<Regex> = OnceLock::new();
    IGNORE.get_or_init(|| {
        Regex::new(r"(?i)(^README|\.spec$|^\.|^tito\.props$|^sources$)")
            .expect("valid ignore regex")
    })
}

/// Whether a directory entry name never counts as content to pack
pub fn is_ignored(file_name: &str) -> bool {
    ignore_regex().is_match(file_name)
}

/// Classifies `dir` as packed or unpacked.
///
/// Packed when any declared source or patch exists as a regular file directly in `dir`, or
/// when every direct entry is ignorable (README*, *.spec, dotfiles, tito.props, sources).
/// Nothing is cached between calls and neither the directory nor `sources` is touched.
pub fn classify(
    fs: &dyn FileSystem,
    dir: &Path,
    sources: &[SourceReference],
) -> Result<ContentKind, ClassifyError> {
    if let Some(present) = sources
        .iter()
        .map(SourceReference::file_name)
        .find(|name| fs.is_file(&dir.join(name)))
    {
        debug!(dir = %dir.display(), source = present, "Declared source present, content is packed");
        return Ok(ContentKind::Packed);
    }

    let entries = fs.read_dir(dir).map_err(|cause| ClassifyError::ReadDir {
        path: dir.to_path_buf(),
        cause,
    })?;

    let mut packable = entries
        .iter()
        .map(|entry| entry.file_name())
        .filter(|name| {
            let ignored = is_ignored(name);
            trace!(entry = name, ignored, "Classifying entry");
            !ignored
        });

    let kind = match packable.next() {
        Some(first) => {
            debug!(dir = %dir.display(), entry = first, "Found content to pack, content is unpacked");
            ContentKind::Unpacked
        }
        None => {
            debug!(dir = %dir.display(), "Only ignored entries, content is packed");
            ContentKind::Packed
        }
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    const SPEC: &str = "Name: testpkg\n";

    fn package() -> MockFileSystem {
        let fs = MockFileSystem::with_root(PathBuf::from("/pkg"));
        fs.add_file("testpkg.spec", SPEC);
        fs
    }

    fn source0() -> Vec<SourceReference> {
        vec![SourceReference::source("source0.tar.gz", 0)]
    }

    #[test]
    fn test_empty_directory_is_packed() {
        let fs = MockFileSystem::with_root(PathBuf::from("/pkg"));
        let kind = classify(&fs, Path::new("/pkg"), &[]).unwrap();
        assert_eq!(kind, ContentKind::Packed);
    }

    #[test]
    fn test_spec_only_is_packed() {
        let fs = package();
        let kind = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        assert_eq!(kind, ContentKind::Packed);
    }

    #[test]
    fn test_source_present_is_packed() {
        let fs = package();
        fs.add_file("source0.tar.gz", "");
        fs.add_file("main.c", "");

        let kind = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        assert_eq!(kind, ContentKind::Packed);
    }

    #[test]
    fn test_other_source_name_is_unpacked() {
        let fs = package();
        fs.add_file("source1.tar.gz", "");

        let kind = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        assert_eq!(kind, ContentKind::Unpacked);
    }

    #[test]
    fn test_patch_present_is_packed() {
        let fs = package();
        fs.add_file("patch.txt", "");
        let sources = vec![
            SourceReference::source("source0.tar.gz", 0),
            SourceReference::patch("patch.txt", 0),
        ];

        let kind = classify(&fs, Path::new("/pkg"), &sources).unwrap();
        assert_eq!(kind, ContentKind::Packed);
    }

    #[test]
    fn test_url_source_matches_basename() {
        let fs = package();
        fs.add_file("hello-1.0.tar.gz", "");
        fs.add_file("main.c", "");
        let sources = vec![SourceReference::source(
            "https://example.org/releases/hello-1.0.tar.gz",
            0,
        )];

        let kind = classify(&fs, Path::new("/pkg"), &sources).unwrap();
        assert_eq!(kind, ContentKind::Packed);
    }

    #[test]
    fn test_source_name_as_directory_does_not_count() {
        let fs = package();
        fs.add_dir("source0.tar.gz");

        let kind = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        assert_eq!(kind, ContentKind::Unpacked);
    }

    #[test]
    fn test_ignored_files_only_in_subdirectory_still_count_as_content() {
        let fs = package();
        fs.add_file("docs/README", "");

        let kind = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        assert_eq!(kind, ContentKind::Unpacked);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let fs = package();
        fs.add_file("main.c", "");

        let first = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        let second = classify(&fs, Path::new("/pkg"), &source0()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let fs = MockFileSystem::new();
        let err = classify(&fs, Path::new("/elsewhere"), &[]).unwrap_err();
        assert!(err.to_string().contains("/elsewhere"));
    }

    #[test]
    fn test_ignore_predicate() {
        for name in [
            "README", "readme", "README.md", "Readme.txt", "tito.props", "TITO.PROPS", "x.spec",
            "X.SPEC", "sources", "Sources", ".hidden", ".git",
        ] {
            assert!(is_ignored(name), "{} should be ignored", name);
        }
        for name in [
            "main.c",
            "MY_README",
            "spec.txt",
            "sources.txt",
            "my.sources",
            "tito.props.bak",
            "source0.tar.gz",
        ] {
            assert!(!is_ignored(name), "{} should not be ignored", name);
        }
    }

    #[test]
    fn test_content_kind_display() {
        assert_eq!(ContentKind::Packed.to_string(), "packed");
        assert_eq!(ContentKind::Unpacked.to_string(), "unpacked");
        assert!(ContentKind::Packed.is_packed());
    }
}
