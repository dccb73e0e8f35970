//! Package working directory operations
//!
//! [`PackageDir`] ties the spec evaluator, the content classifier, the archiver, the
//! lookaside resolver and `rpmbuild` together for one directory holding a spec file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, RpkgConfig};
use crate::content::{classify, pack, ArchiveError, ArchiveSpec, ClassifyError, ContentKind};
use crate::fs::FileSystem;
use crate::lookaside::{
    DownloadRequest, HashAlgorithm, LookasideError, LookasideResolver, ResolvedDownload,
};
use crate::namespace::{git_push_url, module_from_url};
use crate::process::{CommandRunner, Invocation, ProcessError};
use crate::sources_file::{self, SourcesFileError};
use crate::spec::{MacroContext, ParsedSpec, SpecEvaluator, SpecParseError};

pub const SOURCES_FILE: &str = "sources";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error(transparent)]
    SpecParse(#[from] SpecParseError),

    #[error("Content of {0} is not of unpacked type")]
    NotUnpacked(PathBuf),

    #[error("No Source0 declared in {0}")]
    NoSourceZero(PathBuf),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Lookaside(#[from] LookasideError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    SourcesFile(#[from] SourcesFileError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No spec file found in {0}")]
    NoSpecFile(PathBuf),

    #[error("Multiple spec files found in {path}: {}. Use --spec to pick one", .candidates.join(", "))]
    AmbiguousSpec {
        path: PathBuf,
        candidates: Vec<String>,
    },

    #[error("Failed to list {path}: {cause:#}")]
    ReadDir { path: PathBuf, cause: anyhow::Error },

    #[error("Failed to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("{program} failed with exit status {status:?}")]
    BuildFailed {
        program: String,
        status: Option<i32>,
    },
}

/// A package working directory: one spec plus its sources, patches and project files
pub struct PackageDir {
    path: PathBuf,
    config: RpkgConfig,
    fs: Arc<dyn FileSystem>,
    evaluator: Arc<dyn SpecEvaluator>,
    runner: Arc<dyn CommandRunner>,
    resolver: Option<Arc<LookasideResolver>>,
    spec: Option<PathBuf>,
    module_name: Option<String>,
    user: Option<String>,
    quiet: bool,
}

impl PackageDir {
    pub fn new(
        path: impl Into<PathBuf>,
        config: RpkgConfig,
        fs: Arc<dyn FileSystem>,
        evaluator: Arc<dyn SpecEvaluator>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            path: path.into(),
            config,
            fs,
            evaluator,
            runner,
            resolver: None,
            spec: None,
            module_name: None,
            user: None,
            quiet: false,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<LookasideResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Uses `spec` instead of discovering the spec file; relative paths are taken from the
    /// package directory
    pub fn with_spec(mut self, spec: Option<PathBuf>) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_module_name(mut self, module_name: Option<String>) -> Self {
        self.module_name = module_name;
        self
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &RpkgConfig {
        &self.config
    }

    /// The spec file to work with: the one given explicitly, or the single `*.spec` entry
    /// of the package directory
    pub fn spec_path(&self) -> Result<PathBuf, PackageError> {
        if let Some(spec) = &self.spec {
            return Ok(self.path.join(spec));
        }

        let entries = self
            .fs
            .read_dir(&self.path)
            .map_err(|cause| PackageError::ReadDir {
                path: self.path.clone(),
                cause,
            })?;
        let mut specs: Vec<_> = entries
            .into_iter()
            .filter(|entry| entry.is_spec() && self.fs.is_file(entry.path()))
            .collect();

        match specs.len() {
            0 => Err(PackageError::NoSpecFile(self.path.clone())),
            1 => Ok(specs.remove(0).path().to_path_buf()),
            _ => Err(PackageError::AmbiguousSpec {
                path: self.path.clone(),
                candidates: specs.iter().map(|e| e.file_name().to_string()).collect(),
            }),
        }
    }

    /// Evaluates the spec with `_sourcedir` bound to the package directory
    pub fn parse_spec(&self) -> Result<ParsedSpec, PackageError> {
        let spec_path = self.spec_path()?;
        let macros = MacroContext::new().with_source_dir(&self.path);
        let parsed = self.evaluator.parse_spec(&spec_path, &macros)?;
        debug!(
            spec = %spec_path.display(),
            name = %parsed.name,
            version = %parsed.version,
            sources = parsed.sources.len(),
            "Spec evaluated"
        );
        Ok(parsed)
    }

    pub fn content_kind(&self) -> Result<ContentKind, PackageError> {
        let parsed = self.parse_spec()?;
        Ok(classify(self.fs.as_ref(), &self.path, parsed.sources())?)
    }

    pub fn is_packed(&self) -> Result<bool, PackageError> {
        Ok(self.content_kind()?.is_packed())
    }

    /// Packs the unpacked content of the directory into the file Source0 names, placed in
    /// `outdir` (the package directory by default).
    pub fn make_source(&self, outdir: Option<&Path>) -> Result<PathBuf, PackageError> {
        let parsed = self.parse_spec()?;
        let spec_path = self.spec_path()?;

        if classify(self.fs.as_ref(), &self.path, parsed.sources())?.is_packed() {
            return Err(PackageError::NotUnpacked(self.path.clone()));
        }

        let source_zero = parsed
            .primary_source()
            .ok_or_else(|| PackageError::NoSourceZero(spec_path.clone()))?;

        let outdir = outdir.unwrap_or(&self.path);
        create_dir(outdir)?;
        let target = outdir.join(source_zero.file_name());

        let archive = ArchiveSpec::new(&self.path, target, parsed.archive_root());
        let written = pack(&archive)?;
        info!(archive = %written.display(), "Source0 created");
        Ok(written)
    }

    /// Namespace of the package on the lookaside cache
    pub fn namespace(
        &self,
        spec_name: impl FnOnce() -> Result<String, PackageError>,
    ) -> Result<String, PackageError> {
        if let Some(name) = self.module_name.as_deref().filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }

        let templates = self.config.clone_url_templates();
        if !templates.is_empty() {
            if let Some(url) = git_push_url(self.runner.as_ref(), &self.path) {
                if let Some(module) = module_from_url(&url, &templates, self.user.as_deref()) {
                    debug!(%url, %module, "Namespace from push URL");
                    return Ok(module);
                }
                debug!(%url, "Push URL matches no clone URL template");
            }
        }

        spec_name()
    }

    /// Downloads every artifact listed in the `sources` file into `outdir` (the package
    /// directory by default). Without a `sources` file there is nothing to do.
    pub fn sources(&self, outdir: Option<&Path>) -> Result<Vec<ResolvedDownload>, PackageError> {
        let sources_path = self.path.join(SOURCES_FILE);
        if !self.fs.is_file(&sources_path) {
            debug!(path = %sources_path.display(), "No sources file");
            return Ok(Vec::new());
        }

        let content = self
            .fs
            .read_to_string(&sources_path)
            .map_err(|cause| SourcesFileError::Read {
                path: sources_path.clone(),
                cause,
            })?;
        let entries = sources_file::parse(&sources_path, &content)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let resolver = self
            .resolver
            .as_ref()
            .ok_or(PackageError::Config(ConfigError::MissingLookaside))?;
        let namespace = self.namespace(|| Ok(self.parse_spec()?.name))?;

        let outdir = outdir.unwrap_or(&self.path);
        create_dir(outdir)?;

        entries
            .into_iter()
            .map(|entry| -> Result<ResolvedDownload, PackageError> {
                let request = DownloadRequest {
                    namespace: namespace.clone(),
                    destination: outdir.join(&entry.file),
                    filename: entry.file,
                    hash: entry.hash,
                    hash_algorithm: entry.hash_algorithm,
                };
                Ok(resolver.resolve_and_download(&request)?)
            })
            .collect()
    }

    /// The `rpmbuild` invocation that builds the source rpm of `spec`
    pub fn srpm_command(&self, spec: &Path, outdir: Option<&Path>) -> Invocation {
        let dir = self.path.display().to_string();
        let mut invocation = Invocation::new("rpmbuild").current_dir(&self.path);

        for name in ["_sourcedir", "_specdir", "_builddir", "_srcrpmdir", "_rpmdir"] {
            invocation = invocation
                .arg("--define")
                .arg(format!("{} {}", name, dir));
        }
        if self.quiet {
            invocation = invocation.arg("--quiet");
        }

        let hash = self.config.lookaside_hash;
        if hash != HashAlgorithm::Sha256 {
            invocation = invocation
                .arg("--define")
                .arg(format!("_source_filedigest_algorithm {}", hash))
                .arg("--define")
                .arg(format!("_binary_filedigest_algorithm {}", hash));
        }
        if let Some(outdir) = outdir {
            invocation = invocation
                .arg("--define")
                .arg(format!("_srcrpmdir {}", outdir.display()));
        }

        invocation
            .args(["--nodeps", "-bs"])
            .arg(spec.display().to_string())
            .inherit_output()
    }

    /// Runs `rpmbuild -bs` on the spec; sources are expected to be in place already
    pub fn srpm(&self, outdir: Option<&Path>) -> Result<(), PackageError> {
        let spec = self.spec_path()?;
        if let Some(outdir) = outdir {
            create_dir(outdir)?;
        }
        let invocation = self.srpm_command(&spec, outdir);
        info!(command = %invocation, "Building source rpm");

        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(PackageError::BuildFailed {
                program: invocation.program,
                status: output.status,
            });
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<(), PackageError> {
    fs::create_dir_all(dir).map_err(|source| PackageError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{MockFileSystem, RealFileSystem};
    use crate::lookaside::{Downloader, LookasideEndpoint, Prober};
    use crate::process::CommandOutput;
    use crate::spec::{BuiltinSpecEvaluator, SourceReference};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRunner {
        seen: Mutex<Vec<Invocation>>,
        status: i32,
        stdout: String,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(CommandOutput {
                status: Some(self.status),
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }
    }

    struct FixedSpec(ParsedSpec);

    impl SpecEvaluator for FixedSpec {
        fn parse_spec(&self, _: &Path, _: &MacroContext) -> Result<ParsedSpec, SpecParseError> {
            Ok(self.0.clone())
        }
    }

    fn parsed(sources: Vec<SourceReference>) -> ParsedSpec {
        ParsedSpec {
            name: "testpkg".to_string(),
            version: "1".to_string(),
            release: "1".to_string(),
            sources,
        }
    }

    fn mock_package(fs: Arc<MockFileSystem>, sources: Vec<SourceReference>) -> PackageDir {
        PackageDir::new(
            fs.root().to_path_buf(),
            RpkgConfig::default(),
            fs,
            Arc::new(FixedSpec(parsed(sources))),
            Arc::new(RecordingRunner::default()),
        )
    }

    const SPEC: &str = "Name: testpkg\nVersion: 1\nRelease: 1\nSummary: test\nLicense: MIT\n\
                        Source0: source0.tar.gz\n\n%description\ntest\n";

    fn real_package(dir: &Path, runner: Arc<RecordingRunner>) -> PackageDir {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        PackageDir::new(
            dir,
            RpkgConfig::default(),
            fs.clone(),
            Arc::new(BuiltinSpecEvaluator::new(fs)),
            runner,
        )
    }

    #[test]
    fn test_spec_discovery() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        fs.add_file("testpkg.spec", "");
        fs.add_file("README", "");
        let package = mock_package(fs, vec![]);

        assert_eq!(package.spec_path().unwrap(), PathBuf::from("/pkg/testpkg.spec"));
    }

    #[test]
    fn test_spec_discovery_none_or_many() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        fs.add_dir("dir.spec");
        let package = mock_package(fs.clone(), vec![]);
        assert!(matches!(package.spec_path(), Err(PackageError::NoSpecFile(_))));

        fs.add_file("a.spec", "");
        fs.add_file("b.spec", "");
        let err = package.spec_path().unwrap_err();
        assert!(matches!(err, PackageError::AmbiguousSpec { ref candidates, .. } if candidates.len() == 2));
        assert!(err.to_string().contains("a.spec, b.spec"));
    }

    #[test]
    fn test_explicit_spec_is_relative_to_package() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        let package = mock_package(fs, vec![]).with_spec(Some(PathBuf::from("other.spec")));
        assert_eq!(package.spec_path().unwrap(), PathBuf::from("/pkg/other.spec"));
    }

    #[test]
    fn test_is_packed_follows_classifier() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        fs.add_file("testpkg.spec", "");
        let package = mock_package(fs.clone(), vec![SourceReference::source("source0.tar.gz", 0)]);
        assert!(package.is_packed().unwrap());

        fs.add_file("main.c", "");
        assert!(!package.is_packed().unwrap());

        fs.add_file("source0.tar.gz", "");
        assert!(package.is_packed().unwrap());
    }

    #[test]
    fn test_make_source_refuses_packed_content() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        fs.add_file("testpkg.spec", "");
        let package = mock_package(fs, vec![SourceReference::source("source0.tar.gz", 0)]);

        assert!(matches!(package.make_source(None), Err(PackageError::NotUnpacked(_))));
    }

    #[test]
    fn test_make_source_requires_source_zero() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        fs.add_file("testpkg.spec", "");
        fs.add_file("main.c", "");
        let package = mock_package(fs, vec![SourceReference::source("extra.tar.gz", 1)]);

        assert!(matches!(package.make_source(None), Err(PackageError::NoSourceZero(_))));
    }

    #[test]
    fn test_make_source_packs_into_package_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("testpkg.spec"), SPEC).unwrap();
        fs::create_dir(dir.path().join("dir")).unwrap();
        fs::write(dir.path().join("dir/patch.txt"), "").unwrap();
        let package = real_package(dir.path(), Arc::new(RecordingRunner::default()));

        assert!(!package.is_packed().unwrap());
        let archive = package.make_source(None).unwrap();

        assert_eq!(archive, dir.path().join("source0.tar.gz"));
        assert!(archive.is_file());
        assert!(package.is_packed().unwrap());
        assert!(matches!(package.make_source(None), Err(PackageError::NotUnpacked(_))));
    }

    #[test]
    fn test_make_source_creates_outdir() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(dir.path().join("testpkg.spec"), SPEC).unwrap();
        fs::write(dir.path().join("main.c"), "int main(void) { return 0; }\n").unwrap();
        let package = real_package(dir.path(), Arc::new(RecordingRunner::default()));

        let archive = package.make_source(Some(&out.path().join("nested"))).unwrap();
        assert_eq!(archive, out.path().join("nested/source0.tar.gz"));
    }

    #[test]
    fn test_srpm_command_defaults() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        let package = mock_package(fs, vec![]);

        let invocation = package.srpm_command(Path::new("/pkg/testpkg.spec"), None);

        assert_eq!(invocation.program, "rpmbuild");
        assert_eq!(
            invocation.args,
            vec![
                "--define", "_sourcedir /pkg",
                "--define", "_specdir /pkg",
                "--define", "_builddir /pkg",
                "--define", "_srcrpmdir /pkg",
                "--define", "_rpmdir /pkg",
                "--define", "_source_filedigest_algorithm sha512",
                "--define", "_binary_filedigest_algorithm sha512",
                "--nodeps", "-bs", "/pkg/testpkg.spec",
            ]
        );
        assert!(!invocation.capture);
    }

    #[test]
    fn test_srpm_command_sha256_quiet_outdir() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        let config = RpkgConfig {
            lookaside_hash: HashAlgorithm::Sha256,
            ..Default::default()
        };
        let package = PackageDir::new(
            "/pkg",
            config,
            fs,
            Arc::new(FixedSpec(parsed(vec![]))),
            Arc::new(RecordingRunner::default()),
        )
        .with_quiet(true);

        let invocation = package.srpm_command(Path::new("/pkg/testpkg.spec"), Some(Path::new("/out")));
        let args = invocation.args.join(" ");

        assert!(args.contains("--quiet"));
        assert!(!args.contains("filedigest"));
        assert!(args.ends_with("--define _srcrpmdir /out --nodeps -bs /pkg/testpkg.spec"));
    }

    #[test]
    fn test_srpm_reports_build_failure() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        fs.add_file("testpkg.spec", "");
        let runner = Arc::new(RecordingRunner {
            status: 1,
            ..Default::default()
        });
        let package = PackageDir::new(
            "/pkg",
            RpkgConfig::default(),
            fs,
            Arc::new(FixedSpec(parsed(vec![]))),
            runner.clone(),
        );

        let err = package.srpm(None).unwrap_err();
        assert!(matches!(err, PackageError::BuildFailed { status: Some(1), .. }));
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_namespace_priority() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        let runner = Arc::new(RecordingRunner {
            status: 0,
            stdout: "ssh://jdoe@pkgs.example.org/rpms/hello.git\n".to_string(),
            ..Default::default()
        });
        let config = RpkgConfig {
            gitbaseurl: "ssh://%(user)s@pkgs.example.org/%(module)s".to_string(),
            ..Default::default()
        };
        let package = PackageDir::new(
            "/pkg",
            config,
            fs,
            Arc::new(FixedSpec(parsed(vec![]))),
            runner,
        );

        let from_url = package.namespace(|| Ok("spec-name".to_string())).unwrap();
        assert_eq!(from_url, "rpms/hello");

        let package = package.with_module_name(Some("custom/name".to_string()));
        assert_eq!(
            package.namespace(|| Ok("spec-name".to_string())).unwrap(),
            "custom/name"
        );
    }

    #[test]
    fn test_namespace_falls_back_to_spec_name() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        let package = mock_package(fs, vec![]);
        assert_eq!(
            package.namespace(|| Ok("testpkg".to_string())).unwrap(),
            "testpkg"
        );
    }

    struct RecordingCache {
        fetched: Mutex<Vec<DownloadRequest>>,
    }

    impl Prober for RecordingCache {
        fn head_status(&self, _url: &str) -> Result<u16, LookasideError> {
            Ok(200)
        }
    }

    impl Downloader for RecordingCache {
        fn fetch(&self, _url: &str, request: &DownloadRequest) -> Result<(), LookasideError> {
            self.fetched.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    #[test]
    fn test_sources_without_file_is_noop() {
        let fs = Arc::new(MockFileSystem::with_root(PathBuf::from("/pkg")));
        let package = mock_package(fs, vec![]);
        assert!(package.sources(None).unwrap().is_empty());
    }

    #[test]
    fn test_sources_requires_lookaside() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sources"), "MD5 (a.tar.gz) = 00ff\n").unwrap();
        let package = real_package(dir.path(), Arc::new(RecordingRunner::default()));

        assert!(matches!(
            package.sources(None),
            Err(PackageError::Config(ConfigError::MissingLookaside))
        ));
    }

    #[test]
    fn test_sources_downloads_each_entry() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("testpkg.spec"), SPEC).unwrap();
        fs::write(
            dir.path().join("sources"),
            "SHA512 (a.tar.gz) = 00ff\n5d41402abc4b2a76b9719d911017c592  b c.txt\n",
        )
        .unwrap();
        let cache = Arc::new(RecordingCache {
            fetched: Mutex::new(Vec::new()),
        });
        let resolver = Arc::new(LookasideResolver::new(
            LookasideEndpoint::new("https://cache.example.org/pkgs"),
            cache.clone(),
            cache.clone(),
        ));
        let package = real_package(dir.path(), Arc::new(RecordingRunner::default()))
            .with_resolver(resolver);

        let downloads = package.sources(None).unwrap();

        assert_eq!(downloads.len(), 2);
        assert_eq!(
            downloads[1].url,
            "https://cache.example.org/pkgs/testpkg/b%20c.txt/5d41402abc4b2a76b9719d911017c592/b%20c.txt"
        );
        let fetched = cache.fetched.lock().unwrap();
        assert_eq!(fetched[0].namespace, "testpkg");
        assert_eq!(fetched[0].hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(fetched[1].hash_algorithm, HashAlgorithm::Md5);
        assert_eq!(fetched[1].destination, dir.path().join("b c.txt"));
    }

    #[test]
    fn test_sources_refuses_names_outside_outdir() {
        for content in [
            "SHA512 (../../../tmp/escaped.tar.gz) = 00\n",
            "MD5 (/etc/evil) = 00\n",
        ] {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("testpkg.spec"), SPEC).unwrap();
            fs::write(dir.path().join("sources"), content).unwrap();
            let cache = Arc::new(RecordingCache {
                fetched: Mutex::new(Vec::new()),
            });
            let resolver = Arc::new(LookasideResolver::new(
                LookasideEndpoint::new("https://cache.example.org/pkgs"),
                cache.clone(),
                cache.clone(),
            ));
            let package = real_package(dir.path(), Arc::new(RecordingRunner::default()))
                .with_resolver(resolver);

            let err = package.sources(None).unwrap_err();

            assert!(
                matches!(
                    err,
                    PackageError::SourcesFile(SourcesFileError::Malformed { line: 1, .. })
                ),
                "{:?}",
                err
            );
            assert!(cache.fetched.lock().unwrap().is_empty());
        }
    }
}
