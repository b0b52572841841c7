//! Command handlers invoked by the binary
//!
//! Each handler returns a process exit code: 0 when the command ran to
//! completion, 1 when startup failed. Per-image failures are part of a
//! completed run and do not change the exit code.

use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::commands::{AnalyzeArgs, ScanArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::analysis::FrequencyTable;
use crate::config::BinfinderConfig;
use crate::discovery::{
    strip_scheme, DockerHubProvider, DtrProvider, ImageProvider, RegistryV2Provider,
};
use crate::exec::{DockerCliExecutor, DockerRuntime, RegistryCredentials};
use crate::image::{parse_image_list, ImageRef};
use crate::pipeline::{ImagePipeline, Orchestrator, RunSummary};
use crate::progress::LoggingHandler;
use crate::scripts::ScriptSet;
use crate::store::{DiffStore, JsonDiffStore};

/// Rows of the ranking printed after `analyze`
const RANKING_PREVIEW_ROWS: usize = 10;

pub async fn handle_scan(args: &ScanArgs) -> i32 {
    info!("Starting scan");

    let config = match scan_config(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            eprintln!("\nPlease check your environment variables, config file and command-line arguments.");
            return 1;
        }
    };
    debug!("{}", config);

    let summary = match run_scan(args, config, shutdown_signal()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Scan failed: {:#}", e);
            return 1;
        }
    };

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    match formatter.format_summary(&summary) {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(e) => {
            error!("Failed to format output: {}", e);
            1
        }
    }
}

pub async fn handle_analyze(args: &AnalyzeArgs) -> i32 {
    match run_analyze(args) {
        Ok(output) => {
            print!("{}", output);
            0
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            1
        }
    }
}

/// Layers `--config` and command-line flags over the environment defaults
pub fn scan_config(args: &ScanArgs) -> Result<BinfinderConfig> {
    let mut config = BinfinderConfig::default();
    if let Some(path) = &args.config {
        config
            .apply_file(path)
            .with_context(|| format!("Failed to apply config file {}", path.display()))?;
    }

    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(workers) = args.package_workers {
        config.package_query_workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.command_timeout_secs = timeout;
    }
    if args.no_pull {
        config.pull_images = false;
    }

    if args.user.is_some() && args.password.is_none() {
        bail!("--user requires --password");
    }

    config.validate()?;
    Ok(config)
}

fn analyze_config(args: &AnalyzeArgs) -> Result<BinfinderConfig> {
    let mut config = BinfinderConfig::default();
    if let Some(path) = &args.config {
        config
            .apply_file(path)
            .with_context(|| format!("Failed to apply config file {}", path.display()))?;
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    Ok(config)
}

fn credentials(args: &ScanArgs) -> Option<RegistryCredentials> {
    match (&args.user, &args.password) {
        (Some(username), Some(password)) => Some(RegistryCredentials {
            username: username.clone(),
            password: password.clone(),
            server: args.registry.as_deref().map(|r| strip_scheme(r).to_string()),
        }),
        _ => None,
    }
}

/// Registry base URL; bare hosts are assumed to speak HTTPS
fn registry_url(registry: &str) -> String {
    if registry.starts_with("http://") || registry.starts_with("https://") {
        registry.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", registry.trim_end_matches('/'))
    }
}

pub fn select_provider(args: &ScanArgs) -> Result<Box<dyn ImageProvider>> {
    let provider: Box<dyn ImageProvider> = match (&args.registry, args.dtr) {
        (Some(registry), true) => Box::new(DtrProvider::new(
            registry_url(registry),
            credentials(args),
            args.insecure,
        )?),
        (Some(registry), false) => Box::new(RegistryV2Provider::new(
            registry_url(registry),
            credentials(args),
            args.insecure,
        )?),
        (None, _) => Box::new(DockerHubProvider::new()?),
    };
    Ok(provider)
}

async fn resolve_images(args: &ScanArgs) -> Result<Vec<ImageRef>> {
    if let Some(list) = &args.images {
        let images = parse_image_list(list);
        if images.is_empty() {
            bail!("--images did not name any image");
        }
        return Ok(images);
    }

    let top = args
        .top
        .ok_or_else(|| anyhow!("either --images or --top is required"))? as usize;
    let provider = select_provider(args)?;
    info!(provider = provider.name(), top, "Discovering images");
    let images = provider
        .popular_images(top, args.all_tags)
        .await
        .with_context(|| format!("Image discovery through {} failed", provider.name()))?;
    info!(images = images.len(), "Discovered images");
    Ok(images)
}

fn load_scripts(config: &BinfinderConfig) -> Result<ScriptSet> {
    match &config.scripts_dir {
        Some(dir) => ScriptSet::from_dir(dir)
            .with_context(|| format!("Failed to load scripts from {}", dir.display())),
        None => {
            let dir = config.materialized_scripts_dir();
            ScriptSet::materialize(&dir)
                .with_context(|| format!("Failed to write scripts to {}", dir.display()))
        }
    }
}

async fn run_scan<F>(args: &ScanArgs, config: BinfinderConfig, shutdown: F) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let store = JsonDiffStore::create(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    let scripts = load_scripts(&config)?;

    let runtime = DockerRuntime::connect()
        .context("Container runtime unavailable")?
        .with_credentials(credentials(args));
    if !runtime.is_available().await {
        bail!("Container daemon is not reachable; is {} running?", config.runtime_binary);
    }

    let images = resolve_images(args).await?;
    if images.is_empty() {
        warn!("No images to scan");
    }

    let executor = DockerCliExecutor::new(config.runtime_binary.clone(), config.command_timeout())
        .with_runtime(Arc::new(runtime));
    let workers = config.workers;
    let pipeline = ImagePipeline::new(
        Arc::new(executor),
        scripts,
        Arc::new(store) as Arc<dyn DiffStore>,
        Arc::new(config),
        Arc::new(LoggingHandler),
    );

    Ok(Orchestrator::new(pipeline, workers)
        .run_until(images, shutdown)
        .await)
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, cancelling run");
}

fn run_analyze(args: &AnalyzeArgs) -> Result<String> {
    let config = analyze_config(args)?;
    let store = JsonDiffStore::open(&config.output_dir).with_context(|| {
        format!(
            "Failed to open output directory {}",
            config.output_dir.display()
        )
    })?;

    let loaded = store.load_all().context("Failed to read diff records")?;
    if !loaded.skipped.is_empty() {
        warn!(skipped = loaded.skipped.len(), "Some diff records could not be parsed");
    }

    let table = FrequencyTable::from_records(&loaded.records);
    export(&table, &args.csv)?;
    info!(
        records = loaded.records.len(),
        binaries = table.len(),
        csv = %args.csv.display(),
        "Analysis written"
    );

    OutputFormatter::new(OutputFormat::Human).format_ranking(&table, RANKING_PREVIEW_ROWS)
}

fn export(table: &FrequencyTable, path: &Path) -> Result<()> {
    table
        .export_csv(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}
