pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, IsPackedArgs, MakeSourceArgs, SourcesArgs, SrpmArgs};
pub use handlers::GlobalOptions;
pub use output::{IsPackedReport, OutputFormat, OutputFormatter};
