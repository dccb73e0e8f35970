//! Packed/unpacked content handling
//!
//! - [`classifier`] decides whether a package directory still needs its Source0 built
//! - [`archiver`] builds that Source0 tarball from an unpacked tree

pub mod archiver;
pub mod classifier;

pub use archiver::{pack, ArchiveError, ArchiveSpec};
pub use classifier::{classify, is_ignored, ClassifyError, ContentKind};
