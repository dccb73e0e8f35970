use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Packaging utility for RPM spec working directories
#[derive(Parser, Debug)]
#[command(
    name = "rpkg",
    about = "Packaging utility for RPM spec working directories",
    version,
    long_about = "rpkg works with a directory holding an RPM spec file. It downloads external \
                  sources from a lookaside cache, packs unpacked project content into Source0 \
                  and builds source rpms.",
    after_help = "For detailed help pass --help to a subcommand"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'C',
        long,
        global = true,
        value_name = "FILE",
        help = "Specify a config file to use"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Define the directory to work in (defaults to cwd)"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "NAME",
        help = "Override the module name. Otherwise it is discovered from the Git push URL or the spec"
    )]
    pub module_name: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "USER",
        help = "Override the discovered user name"
    )]
    pub user: Option<String>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Run with verbose debug output")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Run quietly only displaying errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Download source files",
        long_about = "Downloads every file listed in the `sources` file from the lookaside \
                      cache and verifies its checksum.\n\n\
                      Examples:\n  \
                      rpkg sources\n  \
                      rpkg sources --outdir /tmp/build"
    )]
    Sources(SourcesArgs),

    #[command(
        name = "make-source",
        about = "Create Source0 from the content of the working directory after downloading \
                 any external sources. The content must be of unpacked type.",
        long_about = "Puts the content of the working directory into a gzip-compressed archive \
                      named after Source0 in the spec file. The content must be of unpacked \
                      type, otherwise no action is taken. Unpacked content contains a spec file \
                      that references no present source or patch, and at least one file that \
                      is not ignored (README*, sources, tito.props, hidden files, *.spec). \
                      Invoking this command with --outdir . makes the content \"packed\"."
    )]
    MakeSource(MakeSourceArgs),

    #[command(
        name = "is-packed",
        about = "Tell whether the content is packed",
        long_about = "Determines whether the package content in the working directory is packed \
                      or unpacked and prints the answer."
    )]
    IsPacked(IsPackedArgs),

    #[command(
        about = "Create a source rpm",
        long_about = "Creates a source rpm out of packed or unpacked content. Sources are \
                      downloaded first and unpacked content is packed into Source0. See \
                      make-source for how the two content types are recognized."
    )]
    Srpm(SrpmArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourcesArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "Directory to download files into (defaults to the working directory)"
    )]
    pub outdir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MakeSourceArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to the spec file. By default the .spec file is autodiscovered"
    )]
    pub spec: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Where to put the generated source. By default cwd"
    )]
    pub outdir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct IsPackedArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to an alternative spec file. Whether the content is packed depends on \
                its Source and Patch definitions as well as on the directory content"
    )]
    pub spec: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct SrpmArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to the spec file. By default the .spec file is autodiscovered"
    )]
    pub spec: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Where to put the generated srpm")]
    pub outdir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
