//! rpkg - packaging utility for RPM spec working directories
//!
//! A package directory holds a spec file plus either the sources it declares ("packed")
//! or the project files themselves ("unpacked"). rpkg tells the two apart, archives
//! unpacked content into Source0, fetches external artifacts from a lookaside cache and
//! hands the result to `rpmbuild`.
//!
//! # Example Usage
//!
//! ```no_run
//! use rpkg::{PackageDir, RpkgConfig};
//! use rpkg::fs::RealFileSystem;
//! use rpkg::process::SystemCommandRunner;
//! use rpkg::spec::BuiltinSpecEvaluator;
//! use std::sync::Arc;
//!
//! let fs = Arc::new(RealFileSystem::new());
//! let package = PackageDir::new(
//!     "/srv/pkgs/hello",
//!     RpkgConfig::default(),
//!     fs.clone(),
//!     Arc::new(BuiltinSpecEvaluator::new(fs)),
//!     Arc::new(SystemCommandRunner),
//! );
//!
//! if !package.is_packed()? {
//!     let archive = package.make_source(None)?;
//!     println!("Wrote: {}", archive.display());
//! }
//! # Ok::<(), rpkg::PackageError>(())
//! ```
//!
//! # Project Structure
//!
//! - [`content`]: packed/unpacked classification and Source0 archiving
//! - [`lookaside`]: lookaside cache layouts, probing and HTTP downloads
//! - [`spec`]: spec evaluation behind the [`SpecEvaluator`] capability
//! - [`package`]: the operations behind each command

pub mod cli;
pub mod config;
pub mod content;
pub mod fs;
pub mod lookaside;
pub mod namespace;
pub mod package;
pub mod process;
pub mod sources_file;
pub mod spec;
pub mod util;

pub use config::{ConfigError, RpkgConfig};
pub use content::{classify, pack, ArchiveError, ArchiveSpec, ContentKind};
pub use lookaside::{
    DownloadRequest, Downloader, HashAlgorithm, LookasideEndpoint, LookasideError,
    LookasideResolver, PathTemplate, ProbeOutcome, Prober, ResolvedDownload,
};
pub use package::{PackageDir, PackageError};
pub use spec::{ParsedSpec, SourceReference, SpecEvaluator, SpecParseError};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_rpkg() {
        assert_eq!(NAME, "rpkg");
    }
}
