//! Parser for the per-package `sources` file
//!
//! Two line formats are accepted:
//!
//! ```text
//! SHA512 (hello-1.0.tar.gz) = 3b2e...
//! 5d41402abc4b2a76b9719d911017c592  hello-1.0.tar.gz
//! ```
//!
//! The second, older form carries no algorithm name and is always md5.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::lookaside::HashAlgorithm;

#[derive(Debug, Error)]
pub enum SourcesFileError {
    #[error("Failed to read {path}: {cause:#}")]
    Read { path: PathBuf, cause: anyhow::Error },

    #[error("{path}:{line}: malformed entry: {content}")]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("{path}:{line}: unsupported hash algorithm {algorithm}")]
    UnsupportedHash {
        path: PathBuf,
        line: usize,
        algorithm: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub hash_algorithm: HashAlgorithm,
    pub file: String,
    pub hash: String,
}

fn bsd_line() -> &'static Regex {
    static BSD: OnceLock<Regex> = OnceLock::new();
    BSD.get_or_init(|| {
        Regex::new(r"^(?P<algo>[A-Za-z0-9]+) \((?P<file>.+)\) = (?P<hash>[0-9a-fA-F]+)$")
            .expect("valid BSD sources regex")
    })
}

fn legacy_line() -> &'static Regex {
    static LEGACY: OnceLock<Regex> = OnceLock::new();
    LEGACY.get_or_init(|| {
        Regex::new(r"^(?P<hash>[0-9a-fA-F]+)  (?P<file>.+)$").expect("valid legacy sources regex")
    })
}

/// Entries name files inside the download directory, never paths
fn is_plain_file_name(file: &str) -> bool {
    !(file.is_empty() || file == "." || file == ".." || file.contains('/') || file.contains('\\'))
}

/// Parses the contents of a `sources` file. `path` is only used in error messages.
pub fn parse(path: &Path, content: &str) -> Result<Vec<SourceEntry>, SourcesFileError> {
    let mut entries = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let malformed = || SourcesFileError::Malformed {
            path: path.to_path_buf(),
            line: line_no,
            content: line.to_string(),
        };

        let entry = if let Some(caps) = bsd_line().captures(line) {
            let algorithm = &caps["algo"];
            let hash_algorithm = algorithm.parse::<HashAlgorithm>().map_err(|_| {
                SourcesFileError::UnsupportedHash {
                    path: path.to_path_buf(),
                    line: line_no,
                    algorithm: algorithm.to_string(),
                }
            })?;
            SourceEntry {
                hash_algorithm,
                file: caps["file"].to_string(),
                hash: caps["hash"].to_lowercase(),
            }
        } else if let Some(caps) = legacy_line().captures(line) {
            SourceEntry {
                hash_algorithm: HashAlgorithm::Md5,
                file: caps["file"].to_string(),
                hash: caps["hash"].to_lowercase(),
            }
        } else {
            return Err(malformed());
        };

        if !is_plain_file_name(&entry.file) {
            return Err(malformed());
        }
        entries.push(entry);
    }

    Ok(entries)
}
