//! Shared helpers for integration tests

use std::fs;
use std::path::{Path, PathBuf};

/// A package directory with a spec declaring `Source0: <source0>`
pub fn create_package(dir: &Path, name: &str, source0: &str) -> PathBuf {
    let spec = dir.join(format!("{}.spec", name));
    fs::write(
        &spec,
        format!(
            "Name: {}\nVersion: 1\nRelease: 1\nSummary: Test package\nLicense: MIT\n\
             Source0: {}\n\n%description\nTest package\n",
            name, source0
        ),
    )
    .expect("Failed to write spec");
    spec
}
