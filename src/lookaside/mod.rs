//! Lookaside cache access
//!
//! Artifacts live on the cache under one of two path layouts and a server does not say
//! which one it uses. [`LookasideResolver`] probes the candidates with `HEAD` requests in a
//! fixed order and hands the winning URL to a [`Downloader`]. The HTTP side is behind the
//! [`Prober`] and [`Downloader`] traits; [`HttpLookaside`] implements both with `reqwest`.

mod hash;
mod http;
mod resolver;

pub use hash::{file_digest, file_matches, Hasher, HashAlgorithm};
pub use http::{HttpLookaside, HttpOptions};
pub use resolver::{LookasideResolver, ProbeOutcome, ResolvedDownload};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookasideError {
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHash(String),

    #[error("Invalid lookaside configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// URL path layout of a lookaside cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathTemplate {
    /// `{name}/{file}/{hash}/{file}`
    Legacy,
    /// `{name}/{file}/{hashtype}/{hash}/{file}`
    #[default]
    Current,
}

impl PathTemplate {
    /// Order in which candidates are probed
    pub const PROBE_ORDER: [PathTemplate; 2] = [PathTemplate::Legacy, PathTemplate::Current];

    pub fn render(self, namespace: &str, filename: &str, hash: &str, algorithm: HashAlgorithm) -> String {
        let file = encode_filename(filename);
        match self {
            PathTemplate::Legacy => format!("{}/{}/{}/{}", namespace, file, hash, file),
            PathTemplate::Current => {
                format!("{}/{}/{}/{}/{}", namespace, file, algorithm, hash, file)
            }
        }
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathTemplate::Legacy => f.write_str("legacy"),
            PathTemplate::Current => f.write_str("current"),
        }
    }
}

impl FromStr for PathTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(PathTemplate::Legacy),
            "current" => Ok(PathTemplate::Current),
            other => Err(format!(
                "Invalid lookaside layout: {}. Valid options: legacy, current",
                other
            )),
        }
    }
}

/// Spaces are the only character the cache expects escaped
pub fn encode_filename(filename: &str) -> String {
    filename.replace(' ', "%20")
}

/// Where a lookaside cache lives and how it lays out its paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookasideEndpoint {
    pub base_url: String,
    /// Used when probing cannot tell which layout the server has
    pub default_template: PathTemplate,
}

impl LookasideEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_template: PathTemplate::default(),
        }
    }

    pub fn with_default_template(mut self, template: PathTemplate) -> Self {
        self.default_template = template;
        self
    }

    pub fn templates(&self) -> [PathTemplate; 2] {
        PathTemplate::PROBE_ORDER
    }

    pub fn url_for(&self, template: PathTemplate, request: &DownloadRequest) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            template.render(
                &request.namespace,
                &request.filename,
                &request.hash,
                request.hash_algorithm
            )
        )
    }
}

/// One artifact to fetch from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub namespace: String,
    pub filename: String,
    pub hash: String,
    pub hash_algorithm: HashAlgorithm,
    pub destination: PathBuf,
}

pub trait Prober: Send + Sync {
    /// Issues `HEAD url` and returns the HTTP status code
    fn head_status(&self, url: &str) -> Result<u16, LookasideError>;
}

pub trait Downloader: Send + Sync {
    /// Fetches `url` into `request.destination` and verifies it against `request.hash`.
    ///
    /// A mismatching download must not be left at the destination.
    fn fetch(&self, url: &str, request: &DownloadRequest) -> Result<(), LookasideError>;
}
