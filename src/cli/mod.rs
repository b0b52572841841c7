pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{AnalyzeArgs, CliArgs, Commands, ScanArgs};
pub use output::{OutputFormat, OutputFormatter};
