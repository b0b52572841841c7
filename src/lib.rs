//! binfinder - audits container images for executables no package manager owns
//!
//! Each image is run in a throwaway container. Its OS family decides which
//! package manager is asked for the set of owned paths, a filesystem sweep lists
//! every native executable, and the difference is persisted as a diff record.
//! Records from many images can then be ranked by how often a path recurs.
//!
//! # Core Concepts
//!
//! - **Execution port**: the only way the pipeline touches an image
//!   ([`exec::ExecutionPort`]); a scripted [`exec::MockExecutor`] stands in
//!   for the container runtime in tests
//! - **Manifest providers**: Alpine (`apk`), Debian-like (`dpkg`) and RHEL-like
//!   (`rpm`) sources of package-owned paths
//! - **Diff record**: per-image list of unaccounted executables, written as
//!   `<image>-diff.json`
//!
//! # Example Usage
//!
//! ```ignore
//! use binfinder::{BinfinderConfig, ImagePipeline, Orchestrator};
//!
//! let pipeline = ImagePipeline::new(executor, scripts, store, config, progress);
//! let summary = Orchestrator::new(pipeline, 4)
//!     .run(vec!["alpine:3.10".into(), "ubuntu:22.04".into()])
//!     .await;
//! println!("{} persisted", summary.persisted());
//! ```
//!
//! # Project Structure
//!
//! - [`os`]: release descriptor classification
//! - [`manifest`]: package-owned path providers
//! - [`scanner`]: executable sweep and filtering
//! - [`diff`]: reconciliation against manifests and the baseline
//! - [`pipeline`]: per-image state machine and the bounded orchestrator
//! - [`analysis`]: recurrence counts across diff records

pub mod analysis;
pub mod cli;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod image;
pub mod manifest;
pub mod os;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod scripts;
pub mod store;
pub mod util;

pub use analysis::FrequencyTable;
pub use config::{BinfinderConfig, ConfigError};
pub use diff::{reconcile, Baseline, DiffRecord};
pub use error::{ExecError, ReconcileError};
pub use exec::{ExecutionPort, Invocation};
pub use image::ImageRef;
pub use manifest::{ManifestProvider, ManifestSet};
pub use os::{LinuxFallback, OsFamily};
pub use pipeline::{ImageOutcome, ImagePipeline, ImageState, Orchestrator, RunSummary};
pub use scanner::{BinaryScanner, ScanRecord};
pub use store::{DiffStore, JsonDiffStore};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
