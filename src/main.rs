use binfinder::cli::commands::{CliArgs, Commands};
use binfinder::cli::handlers::{handle_analyze, handle_scan};
use binfinder::util::logging::{self, LoggingConfig};
use binfinder::VERSION;

use clap::Parser;
use std::process;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("binfinder v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Scan(scan_args) => handle_scan(scan_args).await,
        Commands::Analyze(analyze_args) => handle_analyze(analyze_args).await,
    };

    process::exit(exit_code);
}

/// `--log-level` wins over `-v`/`-q`, which win over the environment
fn init_logging_from_args(args: &CliArgs) {
    let from_env = logging::config_from_env();
    let level = if let Some(level_str) = &args.log_level {
        logging::parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        from_env.level
    };

    logging::init_logging(LoggingConfig { level, ..from_env });
}
