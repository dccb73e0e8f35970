use rpkg::cli::commands::{CliArgs, Commands};
use rpkg::cli::handlers::{
    handle_is_packed, handle_make_source, handle_sources, handle_srpm, GlobalOptions,
};
use rpkg::util::{init_logging, LoggingConfig};
use rpkg::VERSION;

use clap::Parser;
use tracing::debug;

fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_env().with_overrides(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("rpkg v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let globals = GlobalOptions::from(&args);
    let exit_code = match &args.command {
        Commands::Sources(sources_args) => handle_sources(sources_args, &globals),
        Commands::MakeSource(make_args) => handle_make_source(make_args, &globals),
        Commands::IsPacked(is_packed_args) => handle_is_packed(is_packed_args, &globals),
        Commands::Srpm(srpm_args) => handle_srpm(srpm_args, &globals),
    };

    std::process::exit(exit_code);
}
