//! Spec file evaluation
//!
//! The packaging core never interprets a spec itself; it asks a [`SpecEvaluator`] for the
//! package identity and the ordered list of `Source`/`Patch` declarations. Two evaluators
//! ship with the crate:
//!
//! - [`BuiltinSpecEvaluator`] reads the preamble directly and expands simple macros
//! - [`RpmspecEvaluator`] lets `rpmspec -P` do full macro expansion first
//!
//! Evaluating a spec may run arbitrary shell through `%()` when rpm is involved, so only
//! trusted specs should be handed to the rpmspec evaluator.

mod builtin;
mod rpmspec;

pub use builtin::BuiltinSpecEvaluator;
pub use rpmspec::RpmspecEvaluator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::fs::FileSystem;
use crate::process::{find_in_path, CommandRunner};

/// Evaluation of a spec file failed; the spec is malformed or its macros did not expand
#[derive(Debug, Error)]
#[error("Failed to parse spec {path}: {message}")]
pub struct SpecParseError {
    pub path: PathBuf,
    pub message: String,
}

impl SpecParseError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Bit set describing what kind of declaration a [`SourceReference`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceFlags(u32);

impl SourceFlags {
    /// Declared with a `Source` tag
    pub const SOURCE: SourceFlags = SourceFlags(1);
    /// Declared with a `Patch` tag
    pub const PATCH: SourceFlags = SourceFlags(1 << 1);
    /// Listed in `NoSource`/`NoPatch`
    pub const NO: SourceFlags = SourceFlags(1 << 3);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: SourceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: SourceFlags) -> Self {
        Self(self.0 | other.0)
    }
}

/// One `SourceN`/`PatchN` declaration of an evaluated spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    pub path: String,
    pub index: u32,
    pub flags: SourceFlags,
}

impl SourceReference {
    pub fn source(path: impl Into<String>, index: u32) -> Self {
        Self {
            path: path.into(),
            index,
            flags: SourceFlags::SOURCE,
        }
    }

    pub fn patch(path: impl Into<String>, index: u32) -> Self {
        Self {
            path: path.into(),
            index,
            flags: SourceFlags::PATCH,
        }
    }

    /// The name the file carries once it is materialized next to the spec.
    ///
    /// Declarations are frequently URLs, so only the last `/` segment counts.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.path)
    }

    pub fn is_primary(&self) -> bool {
        self.index == 0 && self.flags.contains(SourceFlags::SOURCE)
    }
}

/// Returns the Source0 declaration, if the spec has one.
///
/// A spec without Source0 is legitimate; `None` here is not an evaluation failure.
pub fn find_primary_source(sources: &[SourceReference]) -> Option<&SourceReference> {
    sources.iter().find(|reference| reference.is_primary())
}

/// Result of evaluating a spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpec {
    pub name: String,
    pub version: String,
    pub release: String,
    pub sources: Vec<SourceReference>,
}

impl ParsedSpec {
    pub fn sources(&self) -> &[SourceReference] {
        &self.sources
    }

    pub fn primary_source(&self) -> Option<&SourceReference> {
        find_primary_source(&self.sources)
    }

    /// Top-level directory name used inside the Source0 archive
    pub fn archive_root(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// Macro definitions handed to the evaluator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroContext {
    macros: BTreeMap<String, String>,
}

impl MacroContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `_sourcedir` so relative source paths resolve against the package directory
    pub fn with_source_dir(mut self, dir: &Path) -> Self {
        self.define("_sourcedir", dir.display().to_string());
        self
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.macros.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.macros.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub trait SpecEvaluator: Send + Sync {
    fn parse_spec(&self, spec_path: &Path, macros: &MacroContext)
        -> Result<ParsedSpec, SpecParseError>;
}

/// Which evaluator the command-line front end should build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    /// `rpmspec` when it is installed, the built-in reader otherwise
    #[default]
    Auto,
    Builtin,
    Rpmspec,
}

impl FromStr for EvaluatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "builtin" => Ok(Self::Builtin),
            "rpmspec" => Ok(Self::Rpmspec),
            other => Err(format!(
                "Invalid spec evaluator: {}. Valid options: auto, builtin, rpmspec",
                other
            )),
        }
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Builtin => "builtin",
            Self::Rpmspec => "rpmspec",
        };
        f.write_str(name)
    }
}

impl EvaluatorKind {
    pub fn build(
        self,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
    ) -> Arc<dyn SpecEvaluator> {
        let use_rpmspec = match self {
            Self::Builtin => false,
            Self::Rpmspec => true,
            Self::Auto => find_in_path("rpmspec").is_some(),
        };

        if use_rpmspec {
            Arc::new(RpmspecEvaluator::new(runner))
        } else {
            Arc::new(BuiltinSpecEvaluator::new(fs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_of_url_source() {
        let reference = SourceReference::source("https://example.org/dl/hello-1.0.tar.gz", 0);
        assert_eq!(reference.file_name(), "hello-1.0.tar.gz");
    }

    #[test]
    fn test_file_name_of_plain_source() {
        assert_eq!(SourceReference::patch("fix.patch", 1).file_name(), "fix.patch");
    }

    #[test]
    fn test_find_primary_source() {
        let sources = vec![
            SourceReference::patch("fix.patch", 0),
            SourceReference::source("extra.conf", 1),
            SourceReference::source("hello.tar.gz", 0),
        ];
        let primary = find_primary_source(&sources).unwrap();
        assert_eq!(primary.path, "hello.tar.gz");
    }

    #[test]
    fn test_find_primary_source_absent() {
        let sources = vec![
            SourceReference::patch("fix.patch", 0),
            SourceReference::source("extra.conf", 1),
        ];
        assert!(find_primary_source(&sources).is_none());
        assert!(find_primary_source(&[]).is_none());
    }

    #[test]
    fn test_nosource_keeps_primary_bit() {
        let reference = SourceReference {
            path: "hello.tar.gz".to_string(),
            index: 0,
            flags: SourceFlags::SOURCE.union(SourceFlags::NO),
        };
        assert!(reference.is_primary());
        assert_eq!(reference.flags.bits(), 9);
    }

    #[test]
    fn test_archive_root() {
        let spec = ParsedSpec {
            name: "testpkg".to_string(),
            version: "1".to_string(),
            release: "1".to_string(),
            sources: vec![],
        };
        assert_eq!(spec.archive_root(), "testpkg-1");
    }

    #[test]
    fn test_macro_context_source_dir() {
        let macros = MacroContext::new().with_source_dir(Path::new("/pkg"));
        assert_eq!(macros.get("_sourcedir"), Some("/pkg"));
    }

    #[test]
    fn test_evaluator_kind_parsing() {
        assert_eq!("auto".parse::<EvaluatorKind>(), Ok(EvaluatorKind::Auto));
        assert_eq!("Builtin".parse::<EvaluatorKind>(), Ok(EvaluatorKind::Builtin));
        assert_eq!("rpmspec".parse::<EvaluatorKind>(), Ok(EvaluatorKind::Rpmspec));
        assert!("rpm".parse::<EvaluatorKind>().is_err());
    }
}
