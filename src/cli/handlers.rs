//! Command handlers. Each returns the process exit code.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::commands::{CliArgs, IsPackedArgs, MakeSourceArgs, SourcesArgs, SrpmArgs};
use super::output::{IsPackedReport, OutputFormatter};
use crate::config::{ConfigError, RpkgConfig};
use crate::fs::{FileSystem, RealFileSystem};
use crate::lookaside::{HttpLookaside, LookasideResolver};
use crate::package::{PackageDir, PackageError};
use crate::process::{CommandRunner, SystemCommandRunner};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub path: Option<PathBuf>,
    pub module_name: Option<String>,
    pub user: Option<String>,
    pub quiet: bool,
}

impl From<&CliArgs> for GlobalOptions {
    fn from(args: &CliArgs) -> Self {
        Self {
            config: args.config.clone(),
            path: args.path.clone(),
            module_name: args.module_name.clone(),
            user: args.user.clone(),
            quiet: args.quiet,
        }
    }
}

/// Exit code for a failed operation
pub fn exit_code_for(err: &PackageError) -> i32 {
    match err {
        PackageError::Config(_) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}

fn package_path(globals: &GlobalOptions) -> Result<PathBuf, i32> {
    let path = match &globals.path {
        Some(path) => path.clone(),
        None => env::current_dir().map_err(|e| {
            error!("Failed to get current directory: {}", e);
            EXIT_FAILURE
        })?,
    };

    if !path.is_dir() {
        error!("Package path is not a directory: {}", path.display());
        return Err(EXIT_USAGE);
    }

    path.canonicalize().map_err(|e| {
        error!("Failed to canonicalize package path: {}", e);
        EXIT_FAILURE
    })
}

fn build_resolver(config: &RpkgConfig) -> Result<Option<Arc<LookasideResolver>>, i32> {
    let endpoint = match config.lookaside_endpoint() {
        Ok(endpoint) => endpoint,
        Err(ConfigError::MissingLookaside) => {
            debug!("No lookaside cache configured");
            return Ok(None);
        }
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(EXIT_USAGE);
        }
    };

    let http = HttpLookaside::new(&config.http_options()).map_err(|e| {
        error!("Failed to set up lookaside client: {}", e);
        EXIT_USAGE
    })?;
    let http = Arc::new(http);
    debug!(base_url = %endpoint.base_url, "Lookaside cache configured");

    Ok(Some(Arc::new(LookasideResolver::new(
        endpoint,
        http.clone(),
        http,
    ))))
}

/// Loads configuration and wires the real capabilities into a [`PackageDir`]
pub fn open_package(globals: &GlobalOptions, spec: Option<&Path>) -> Result<PackageDir, i32> {
    let path = package_path(globals)?;
    debug!("Package path: {}", path.display());

    let config = RpkgConfig::load(globals.config.as_deref()).map_err(|e| {
        error!("Configuration error: {}", e);
        eprintln!("\nPlease check the configuration file and RPKG_* environment variables.");
        EXIT_USAGE
    })?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
    let evaluator = config.spec_evaluator.build(fs.clone(), runner.clone());
    let resolver = build_resolver(&config)?;

    let mut package = PackageDir::new(path, config, fs, evaluator, runner)
        .with_spec(spec.map(Path::to_path_buf))
        .with_module_name(globals.module_name.clone())
        .with_user(globals.user.clone())
        .with_quiet(globals.quiet);
    if let Some(resolver) = resolver {
        package = package.with_resolver(resolver);
    }
    Ok(package)
}

/// Resolves `path` against the invocation directory; rpmbuild runs from the package directory
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            warn!("Failed to get current directory: {}", e);
            path.to_path_buf()
        }
    }
}

/// `make-source` writes into the invocation directory unless told otherwise
fn make_source_outdir(outdir: Option<&Path>) -> Result<PathBuf, i32> {
    match outdir {
        Some(path) => Ok(absolute(path)),
        None => env::current_dir().map_err(|e| {
            error!("Failed to get current directory: {}", e);
            EXIT_FAILURE
        }),
    }
}

fn download_sources(package: &PackageDir, outdir: Option<&Path>) -> Result<(), i32> {
    let downloads = package.sources(outdir).map_err(|e| {
        error!("Failed to download sources: {}", e);
        exit_code_for(&e)
    })?;
    for download in &downloads {
        debug!(
            destination = %download.destination.display(),
            template = %download.template,
            probe = ?download.probe,
            "Source ready"
        );
    }
    Ok(())
}

pub fn handle_sources(args: &SourcesArgs, globals: &GlobalOptions) -> i32 {
    let package = match open_package(globals, None) {
        Ok(package) => package,
        Err(code) => return code,
    };

    let outdir = args.outdir.as_deref().map(absolute);
    match download_sources(&package, outdir.as_deref()) {
        Ok(()) => EXIT_SUCCESS,
        Err(code) => code,
    }
}

pub fn handle_make_source(args: &MakeSourceArgs, globals: &GlobalOptions) -> i32 {
    let package = match open_package(globals, args.spec.as_deref()) {
        Ok(package) => package,
        Err(code) => return code,
    };

    if let Err(code) = download_sources(&package, None) {
        return code;
    }

    let outdir = match make_source_outdir(args.outdir.as_deref()) {
        Ok(outdir) => outdir,
        Err(code) => return code,
    };
    match package.make_source(Some(&outdir)) {
        Ok(archive) => {
            println!("Wrote: {}", archive.display());
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            exit_code_for(&e)
        }
    }
}

pub fn handle_is_packed(args: &IsPackedArgs, globals: &GlobalOptions) -> i32 {
    let package = match open_package(globals, args.spec.as_deref()) {
        Ok(package) => package,
        Err(code) => return code,
    };

    let result = package
        .spec_path()
        .and_then(|spec| Ok((spec, package.content_kind()?)));
    let (spec, kind) = match result {
        Ok(answer) => answer,
        Err(e) => {
            error!("{}", e);
            return exit_code_for(&e);
        }
    };

    let report = IsPackedReport::new(package.path().to_path_buf(), spec, kind);
    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_is_packed(&report) {
        Ok(output) => {
            println!("{}", output);
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            EXIT_FAILURE
        }
    }
}

pub fn handle_srpm(args: &SrpmArgs, globals: &GlobalOptions) -> i32 {
    let package = match open_package(globals, args.spec.as_deref()) {
        Ok(package) => package,
        Err(code) => return code,
    };

    if let Err(code) = download_sources(&package, None) {
        return code;
    }

    match package.make_source(None) {
        Ok(archive) => info!(archive = %archive.display(), "Packed unpacked content"),
        Err(PackageError::NotUnpacked(_)) => debug!("Content is packed, nothing to archive"),
        Err(e) => {
            error!("{}", e);
            return exit_code_for(&e);
        }
    }

    let outdir = args.outdir.as_deref().map(absolute);
    match package.srpm(outdir.as_deref()) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{}", e);
            exit_code_for(&e)
        }
    }
}
