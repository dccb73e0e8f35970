//! Configuration management for rpkg
//!
//! Settings come from a TOML file with an `[rpkg]` table and are then overridden by
//! environment variables.
//!
//! # File lookup
//!
//! The first of these that applies is used:
//! 1. `--config <FILE>` on the command line
//! 2. `RPKG_CONFIG`
//! 3. `<user config dir>/rpkg/rpkg.toml`
//! 4. `/etc/rpkg/rpkg.toml`
//!
//! A file named explicitly (1 or 2) must exist. When neither default file exists the
//! built-in defaults are used.
//!
//! # Environment Variables
//!
//! - `RPKG_LOOKASIDE`: lookaside cache download URL
//! - `RPKG_LOOKASIDE_CGI`: lookaside upload CGI URL
//! - `RPKG_LOOKASIDE_HASH`: digest for new uploads and srpm payloads - default: "sha512"
//! - `RPKG_LOOKASIDE_LAYOUT`: path layout used when probing is inconclusive (legacy|current) - default: "current"
//! - `RPKG_GITBASEURL`, `RPKG_ANONGITURL`: clone URL templates with `%(user)s`/`%(module)s`
//! - `RPKG_CLIENT_CERT`, `RPKG_CA_CERT`: PEM files for TLS
//! - `RPKG_REQUEST_TIMEOUT`: HTTP timeout in seconds - default: "30"
//! - `RPKG_SPEC_EVALUATOR`: auto|builtin|rpmspec - default: "auto"
//!
//! # Example
//!
//! ```toml
//! [rpkg]
//! lookaside = "https://copr-dist-git.fedorainfracloud.org/repo/pkgs"
//! gitbaseurl = "ssh://%(user)s@copr-dist-git.fedorainfracloud.org/%(module)s"
//! anongiturl = "https://copr-dist-git.fedorainfracloud.org/git/%(module)s"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::lookaside::{HashAlgorithm, HttpOptions, LookasideEndpoint, PathTemplate};
use crate::spec::EvaluatorKind;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;
const SYSTEM_CONFIG: &str = "/etc/rpkg/rpkg.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid configuration file {path}: {source}")]
    Syntax {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("No lookaside URL configured. Set `lookaside` in the [rpkg] table or RPKG_LOOKASIDE")]
    MissingLookaside,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    rpkg: RpkgConfig,
}

/// Main configuration structure for rpkg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpkgConfig {
    /// Lookaside cache download URL
    pub lookaside: Option<String>,

    /// Lookaside upload URL; uploads are not performed but the key is accepted
    pub lookaside_cgi: Option<String>,

    pub lookaside_hash: HashAlgorithm,

    /// Layout assumed when the cache does not answer any probe
    pub lookaside_layout: PathTemplate,

    pub gitbaseurl: String,
    pub anongiturl: String,

    pub client_cert: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    pub spec_evaluator: EvaluatorKind,
}

impl Default for RpkgConfig {
    fn default() -> Self {
        Self {
            lookaside: None,
            lookaside_cgi: None,
            lookaside_hash: HashAlgorithm::default(),
            lookaside_layout: PathTemplate::default(),
            gitbaseurl: String::new(),
            anongiturl: String::new(),
            client_cert: None,
            ca_cert: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            spec_evaluator: EvaluatorKind::default(),
        }
    }
}

fn parse_field<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::ParseError {
        field: field.to_string(),
        error: e.to_string(),
    })
}

impl RpkgConfig {
    /// Loads the configuration file, applies `RPKG_*` overrides and validates the result
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("RPKG_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path));
                }
                Self::from_file(&path)?
            }
            None => match Self::default_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Default locations, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("rpkg").join("rpkg.toml"));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG));
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration");
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Syntax {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.rpkg)
    }

    /// Overrides fields from `RPKG_*` variables; `lookup` returns a variable's value.
    ///
    /// Empty values clear optional settings.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |value: String| (!value.trim().is_empty()).then_some(value);

        if let Some(v) = lookup("RPKG_LOOKASIDE") {
            self.lookaside = optional(v);
        }
        if let Some(v) = lookup("RPKG_LOOKASIDE_CGI") {
            self.lookaside_cgi = optional(v);
        }
        if let Some(v) = lookup("RPKG_LOOKASIDE_HASH") {
            self.lookaside_hash = parse_field("RPKG_LOOKASIDE_HASH", &v)?;
        }
        if let Some(v) = lookup("RPKG_LOOKASIDE_LAYOUT") {
            self.lookaside_layout = parse_field("RPKG_LOOKASIDE_LAYOUT", &v)?;
        }
        if let Some(v) = lookup("RPKG_GITBASEURL") {
            self.gitbaseurl = v;
        }
        if let Some(v) = lookup("RPKG_ANONGITURL") {
            self.anongiturl = v;
        }
        if let Some(v) = lookup("RPKG_CLIENT_CERT") {
            self.client_cert = optional(v).map(PathBuf::from);
        }
        if let Some(v) = lookup("RPKG_CA_CERT") {
            self.ca_cert = optional(v).map(PathBuf::from);
        }
        if let Some(v) = lookup("RPKG_REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_field("RPKG_REQUEST_TIMEOUT", v.trim())?;
        }
        if let Some(v) = lookup("RPKG_SPEC_EVALUATOR") {
            self.spec_evaluator = parse_field("RPKG_SPEC_EVALUATOR", &v)?;
        }
        Ok(())
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` when the timeout is outside 1..=600 seconds or
    /// the lookaside URL is not http(s).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        if let Some(url) = &self.lookaside {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Lookaside URL must be http or https: {}",
                    url
                )));
            }
        }

        Ok(())
    }

    pub fn lookaside_endpoint(&self) -> Result<LookasideEndpoint, ConfigError> {
        let base_url = self
            .lookaside
            .as_deref()
            .ok_or(ConfigError::MissingLookaside)?;
        Ok(LookasideEndpoint::new(base_url)
            .with_default_template(self.lookaside_layout))
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            client_cert: self.client_cert.clone(),
            ca_cert: self.ca_cert.clone(),
        }
    }

    /// Clone URL templates tried, in order, when deriving the lookaside namespace
    pub fn clone_url_templates(&self) -> Vec<&str> {
        [self.gitbaseurl.as_str(), self.anongiturl.as_str()]
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl fmt::Display for RpkgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rpkg Configuration:")?;
        writeln!(
            f,
            "  Lookaside: {}",
            self.lookaside.as_deref().unwrap_or("(not set)")
        )?;
        writeln!(f, "  Lookaside Hash: {}", self.lookaside_hash)?;
        writeln!(f, "  Lookaside Layout: {}", self.lookaside_layout)?;
        if !self.gitbaseurl.is_empty() {
            writeln!(f, "  Git Base URL: {}", self.gitbaseurl)?;
        }
        if !self.anongiturl.is_empty() {
            writeln!(f, "  Anonymous Git URL: {}", self.anongiturl)?;
        }
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Spec Evaluator: {}", self.spec_evaluator)?;
        Ok(())
    }
}
