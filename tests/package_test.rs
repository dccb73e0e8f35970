//! Package directory operations wired to real capabilities

mod support;

use mockito::Server;
use rpkg::fs::RealFileSystem;
use rpkg::lookaside::{HashAlgorithm, HttpLookaside, HttpOptions, LookasideResolver};
use rpkg::process::SystemCommandRunner;
use rpkg::spec::BuiltinSpecEvaluator;
use rpkg::{PackageDir, PackageError, PathTemplate, ProbeOutcome, RpkgConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn package(dir: &Path, config: RpkgConfig) -> PackageDir {
    let fs = Arc::new(RealFileSystem::new());
    let evaluator = Arc::new(BuiltinSpecEvaluator::new(fs.clone()));
    let mut package = PackageDir::new(dir, config.clone(), fs, evaluator, Arc::new(SystemCommandRunner));

    if let Ok(endpoint) = config.lookaside_endpoint() {
        let http = Arc::new(HttpLookaside::new(&HttpOptions::default()).unwrap());
        package = package.with_resolver(Arc::new(LookasideResolver::new(
            endpoint,
            http.clone(),
            http,
        )));
    }
    package
}

#[test]
fn test_make_source_then_packed() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    support::create_package(dir, "hello", "hello-1.tar.gz");
    fs::write(dir.join("hello.c"), "int main(void) { return 0; }\n").unwrap();

    let package = package(dir, RpkgConfig::default());
    assert!(!package.is_packed().unwrap());

    let archive = package.make_source(None).unwrap();
    assert_eq!(archive, dir.canonicalize().unwrap().join("hello-1.tar.gz"));
    assert!(package.is_packed().unwrap());

    let err = package.make_source(None).unwrap_err();
    assert!(matches!(err, PackageError::NotUnpacked(_)));
}

#[test]
fn test_make_source_into_outdir() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    support::create_package(dir, "hello", "https://example.org/dl/hello-1.tar.gz");
    fs::write(dir.join("hello.c"), "").unwrap();
    let out = TempDir::new().unwrap();
    let outdir = out.path().join("nested");

    let archive = package(dir, RpkgConfig::default())
        .make_source(Some(&outdir))
        .unwrap();

    assert_eq!(archive.file_name().unwrap(), "hello-1.tar.gz");
    assert!(outdir.join("hello-1.tar.gz").is_file());
    assert!(!dir.join("hello-1.tar.gz").exists());
}

#[test]
fn test_make_source_without_source_zero() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    fs::write(
        dir.join("hello.spec"),
        "Name: hello\nVersion: 1\nRelease: 1\nSource1: extra.txt\n\n%description\nNo Source0\n",
    )
    .unwrap();
    fs::write(dir.join("hello.c"), "").unwrap();

    let err = package(dir, RpkgConfig::default())
        .make_source(None)
        .unwrap_err();
    assert!(matches!(err, PackageError::NoSourceZero(_)));
}

#[test]
fn test_sources_downloads_listed_files() {
    let body: &[u8] = b"upstream release\n";
    let hash = HashAlgorithm::Sha512.digest(body);
    let current = format!(
        "/repo/rpms/hello/hello-1.tar.gz/sha512/{}/hello-1.tar.gz",
        hash
    );
    let mut server = Server::new();
    server
        .mock("HEAD", format!("/repo/rpms/hello/hello-1.tar.gz/{}/hello-1.tar.gz", hash).as_str())
        .with_status(404)
        .create();
    server.mock("HEAD", current.as_str()).with_status(200).create();
    let get = server
        .mock("GET", current.as_str())
        .with_status(200)
        .with_body(body)
        .expect(1)
        .create();

    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    support::create_package(dir, "hello", "hello-1.tar.gz");
    fs::write(
        dir.join("sources"),
        format!("SHA512 (hello-1.tar.gz) = {}\n", hash),
    )
    .unwrap();

    let config = RpkgConfig {
        lookaside: Some(format!("{}/repo", server.url())),
        ..Default::default()
    };
    let package = package(dir, config).with_module_name(Some("rpms/hello".to_string()));

    let downloads = package.sources(None).unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].template, PathTemplate::Current);
    assert_eq!(downloads[0].probe, ProbeOutcome::Resolved);
    assert_eq!(fs::read(dir.join("hello-1.tar.gz")).unwrap(), body);
    assert!(package.is_packed().unwrap());

    let again = package.sources(None).unwrap();
    assert_eq!(again[0].probe, ProbeOutcome::Skipped);
    get.assert();
}

#[test]
fn test_sources_without_lookaside_configured() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    support::create_package(dir, "hello", "hello-1.tar.gz");
    fs::write(
        dir.join("sources"),
        format!("SHA512 (hello-1.tar.gz) = {}\n", "ab".repeat(64)),
    )
    .unwrap();

    let err = package(dir, RpkgConfig::default())
        .sources(None)
        .unwrap_err();
    assert!(matches!(err, PackageError::Config(_)));
}

#[test]
fn test_no_sources_file_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    support::create_package(temp_dir.path(), "hello", "hello-1.tar.gz");

    let downloads = package(temp_dir.path(), RpkgConfig::default())
        .sources(None)
        .unwrap();
    assert!(downloads.is_empty());
}

#[test]
fn test_ambiguous_spec_discovery() {
    let temp_dir = TempDir::new().unwrap();
    support::create_package(temp_dir.path(), "hello", "hello-1.tar.gz");
    support::create_package(temp_dir.path(), "world", "world-1.tar.gz");

    let err = package(temp_dir.path(), RpkgConfig::default())
        .spec_path()
        .unwrap_err();
    match err {
        PackageError::AmbiguousSpec { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("Expected ambiguous spec error, got {:?}", other),
    }

    let chosen = package(temp_dir.path(), RpkgConfig::default())
        .with_spec(Some("world.spec".into()))
        .spec_path()
        .unwrap();
    assert_eq!(chosen, temp_dir.path().join("world.spec"));
}
