use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Finds executables in container images that no OS package manager owns
#[derive(Parser, Debug)]
#[command(
    name = "binfinder",
    about = "Finds executables in container images that no OS package manager owns",
    version,
    long_about = "binfinder runs each image in a throwaway container, collects the paths its \
                  package manager (apk, dpkg or rpm) claims to own, sweeps the filesystem for \
                  native executables and records the ones nothing accounts for."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Reconcile images and write one diff record per image",
        long_about = "Reconciles each image's executables against its package manifest.\n\n\
                      Examples:\n  \
                      binfinder scan --images alpine:3.10,ubuntu:22.04\n  \
                      binfinder scan --top 50 --workers 4\n  \
                      binfinder scan --top 20 --registry https://registry.local --user ci --password secret\n  \
                      binfinder scan --top 20 --registry https://dtr.corp --dtr --insecure"
    )]
    Scan(ScanArgs),

    #[command(
        about = "Count how often each unaccounted binary recurs across diff records",
        long_about = "Aggregates every diff record in the output directory into a CSV table \
                      ranked by occurrence count.\n\n\
                      Examples:\n  \
                      binfinder analyze\n  \
                      binfinder analyze --output data --csv report.csv"
    )]
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
#[command(group(
    clap::ArgGroup::new("source")
        .required(true)
        .args(["images", "top"])
))]
pub struct ScanArgs {
    #[arg(
        short = 'i',
        long,
        value_name = "LIST",
        help = "Comma separated images to scan, e.g. alpine:3.10,nginx:1.25"
    )]
    pub images: Option<String>,

    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Scan the N most popular images from the selected provider"
    )]
    pub top: Option<u32>,

    #[arg(
        long,
        value_name = "URL",
        requires = "top",
        help = "Discover images from this private registry instead of Docker Hub"
    )]
    pub registry: Option<String>,

    #[arg(long, requires = "registry", help = "Treat --registry as a Docker Trusted Registry")]
    pub dtr: bool,

    #[arg(long, value_name = "USER", help = "Registry user for discovery and pulls")]
    pub user: Option<String>,

    #[arg(long, value_name = "PASSWORD", requires = "user", help = "Registry password")]
    pub password: Option<String>,

    #[arg(long, help = "Accept self-signed registry certificates")]
    pub insecure: bool,

    #[arg(long, requires = "top", help = "Scan every tag of each discovered repository")]
    pub all_tags: bool,

    #[arg(short = 'o', long, value_name = "DIR", help = "Diff record directory")]
    pub output: Option<PathBuf>,

    #[arg(short = 'w', long, value_name = "N", help = "Images processed in parallel")]
    pub workers: Option<usize>,

    #[arg(long, value_name = "N", help = "Concurrent apk package queries")]
    pub package_workers: Option<usize>,

    #[arg(long, value_name = "SECONDS", help = "Timeout for each container call")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Do not pull images before probing them")]
    pub no_pull: bool,

    #[arg(short = 'c', long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Summary format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(short = 'o', long, value_name = "DIR", help = "Diff record directory")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        default_value = "analysis.csv",
        help = "Where to write the ranked table"
    )]
    pub csv: PathBuf,

    #[arg(short = 'c', long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
