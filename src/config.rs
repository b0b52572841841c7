//! Configuration management for binfinder
//!
//! One immutable [`BinfinderConfig`] is built at startup and handed to every
//! component by `Arc`. Values are layered, later layers winning:
//!
//! 1. built-in defaults ([`BinfinderConfig::builtin`])
//! 2. `BINFINDER_*` environment variables ([`BinfinderConfig::default`])
//! 3. an optional TOML file ([`BinfinderConfig::apply_file`])
//! 4. command-line flags, applied by the CLI
//!
//! # Environment Variables
//!
//! - `BINFINDER_OUTPUT_DIR`: Diff record directory - default: "data"
//! - `BINFINDER_WORKERS`: Images processed in parallel - default: "1"
//! - `BINFINDER_PACKAGE_WORKERS`: Concurrent apk package queries - default: "8"
//! - `BINFINDER_TIMEOUT`: Seconds allowed per container call - default: "600"
//! - `BINFINDER_RUNTIME`: Container runtime binary - default: "docker"
//! - `BINFINDER_SCRIPTS_DIR`: Use these companion scripts instead of the bundled ones
//! - `BINFINDER_PULL`: Pull images before probing (true|false) - default: "true"
//! - `BINFINDER_LINUX_FALLBACK`: Family for bare "linux" releases (rhel|unknown) - default: "rhel"
//! - `BINFINDER_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use binfinder::BinfinderConfig;
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = BinfinderConfig::default();
//! config.apply_file(Path::new("binfinder.toml"))?;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::diff::Baseline;
use crate::image::ImageRef;
use crate::os::LinuxFallback;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OUTPUT_DIR: &str = "data";
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_PACKAGE_QUERY_WORKERS: usize = 8;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_RUNTIME_BINARY: &str = "docker";
const DEFAULT_TOOLING_MARKER: &str = "binfinder";
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_COMMAND_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Directory under `output_dir` holding the materialized companion scripts
pub const SCRIPTS_SUBDIR: &str = ".scripts";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinfinderConfig {
    /// Where diff records are written and read back
    pub output_dir: PathBuf,

    /// Global bound on images processed in parallel
    pub workers: usize,

    /// Bound on concurrent `apk info -L` queries across the whole run
    pub package_query_workers: usize,

    /// Timeout for each container invocation, in seconds
    pub command_timeout_secs: u64,

    pub runtime_binary: String,

    /// Operator-supplied companion scripts; bundled scripts are used when unset
    pub scripts_dir: Option<PathBuf>,

    pub pull_images: bool,

    pub linux_fallback: LinuxFallback,

    /// Paths containing this marker belong to the scanner's own tooling
    pub tooling_marker: String,

    pub baseline: Baseline,

    /// Images that are never processed
    pub sentinel_images: Vec<String>,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for BinfinderConfig {
    /// Built-in defaults overlaid with `BINFINDER_*` environment variables
    fn default() -> Self {
        let mut config = Self::builtin();
        config.apply_env();
        config
    }
}

/// Keys accepted in a TOML config file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub output_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub package_query_workers: Option<usize>,
    pub command_timeout_secs: Option<u64>,
    pub runtime_binary: Option<String>,
    pub scripts_dir: Option<PathBuf>,
    pub pull_images: Option<bool>,
    pub linux_fallback: Option<LinuxFallback>,
    pub tooling_marker: Option<String>,
    pub baseline: Option<Baseline>,
    pub sentinel_images: Option<Vec<String>>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl BinfinderConfig {
    /// Defaults without consulting the environment
    pub fn builtin() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            workers: DEFAULT_WORKERS,
            package_query_workers: DEFAULT_PACKAGE_QUERY_WORKERS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            runtime_binary: DEFAULT_RUNTIME_BINARY.to_string(),
            scripts_dir: None,
            pull_images: true,
            linux_fallback: LinuxFallback::default(),
            tooling_marker: DEFAULT_TOOLING_MARKER.to_string(),
            baseline: Baseline::default(),
            sentinel_images: vec!["busybox".to_string()],
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    // Unparseable values are ignored and the previous layer's value stays.
    fn apply_env(&mut self) {
        if let Ok(dir) = env::var("BINFINDER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(workers) = env::var("BINFINDER_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.workers = workers;
        }
        if let Some(workers) = env::var("BINFINDER_PACKAGE_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.package_query_workers = workers;
        }
        if let Some(timeout) = env::var("BINFINDER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.command_timeout_secs = timeout;
        }
        if let Ok(runtime) = env::var("BINFINDER_RUNTIME") {
            self.runtime_binary = runtime;
        }
        if let Ok(dir) = env::var("BINFINDER_SCRIPTS_DIR") {
            self.scripts_dir = Some(PathBuf::from(dir));
        }
        if let Some(pull) = env::var("BINFINDER_PULL")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
        {
            self.pull_images = pull;
        }
        if let Some(fallback) = env::var("BINFINDER_LINUX_FALLBACK")
            .ok()
            .and_then(|v| v.parse::<LinuxFallback>().ok())
        {
            self.linux_fallback = fallback;
        }
        if let Ok(level) = env::var("BINFINDER_LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
    }

    /// Overlays the keys present in a TOML file
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let file = ConfigFile::load(path)?;
        self.merge(file);
        Ok(())
    }

    pub fn merge(&mut self, file: ConfigFile) {
        if let Some(v) = file.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = file.workers {
            self.workers = v;
        }
        if let Some(v) = file.package_query_workers {
            self.package_query_workers = v;
        }
        if let Some(v) = file.command_timeout_secs {
            self.command_timeout_secs = v;
        }
        if let Some(v) = file.runtime_binary {
            self.runtime_binary = v;
        }
        if let Some(v) = file.scripts_dir {
            self.scripts_dir = Some(v);
        }
        if let Some(v) = file.pull_images {
            self.pull_images = v;
        }
        if let Some(v) = file.linux_fallback {
            self.linux_fallback = v;
        }
        if let Some(v) = file.tooling_marker {
            self.tooling_marker = v;
        }
        if let Some(v) = file.baseline {
            self.baseline = v;
        }
        if let Some(v) = file.sentinel_images {
            self.sentinel_images = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v.to_lowercase();
        }
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "Workers must be at least 1".to_string(),
            ));
        }
        if self.package_query_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "Package query workers must be at least 1".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Command timeout must be at least 1 second".to_string(),
            ));
        }
        if self.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Command timeout cannot exceed 24 hours".to_string(),
            ));
        }
        if self.runtime_binary.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Runtime binary cannot be empty".to_string(),
            ));
        }
        if self.tooling_marker.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Tooling marker cannot be blank".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Directory the bundled scripts are written to when `scripts_dir` is unset
    pub fn materialized_scripts_dir(&self) -> PathBuf {
        self.output_dir.join(SCRIPTS_SUBDIR)
    }

    /// Sentinels match either the full reference or its repository name
    pub fn is_sentinel(&self, image: &ImageRef) -> bool {
        self.sentinel_images
            .iter()
            .any(|s| s == image.as_str() || s == image.name())
    }
}

impl fmt::Display for BinfinderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Binfinder Configuration:")?;
        writeln!(f, "  Output Dir: {}", self.output_dir.display())?;
        writeln!(f, "  Workers: {}", self.workers)?;
        writeln!(f, "  Package Query Workers: {}", self.package_query_workers)?;
        writeln!(f, "  Command Timeout: {}s", self.command_timeout_secs)?;
        writeln!(f, "  Runtime: {}", self.runtime_binary)?;
        if let Some(ref dir) = self.scripts_dir {
            writeln!(f, "  Scripts Dir: {}", dir.display())?;
        }
        writeln!(f, "  Pull Images: {}", self.pull_images)?;
        writeln!(f, "  Linux Fallback: {:?}", self.linux_fallback)?;
        writeln!(f, "  Sentinel Images: {}", self.sentinel_images.join(", "))?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    fn test_builtin_defaults() {
        let config = BinfinderConfig::builtin();

        assert_eq!(config.output_dir, PathBuf::from("data"));
        assert_eq!(config.workers, 1);
        assert_eq!(config.package_query_workers, 8);
        assert_eq!(config.command_timeout(), Duration::from_secs(600));
        assert_eq!(config.linux_fallback, LinuxFallback::RhelLike);
        assert_eq!(config.sentinel_images, vec!["busybox"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("BINFINDER_OUTPUT_DIR", "/var/lib/binfinder"),
            EnvGuard::set("BINFINDER_WORKERS", "4"),
            EnvGuard::set("BINFINDER_TIMEOUT", "120"),
            EnvGuard::set("BINFINDER_PULL", "false"),
            EnvGuard::set("BINFINDER_LINUX_FALLBACK", "unknown"),
            EnvGuard::set("BINFINDER_LOG_LEVEL", "DEBUG"),
        ];

        let config = BinfinderConfig::default();

        assert_eq!(config.output_dir, PathBuf::from("/var/lib/binfinder"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.command_timeout_secs, 120);
        assert!(!config.pull_images);
        assert_eq!(config.linux_fallback, LinuxFallback::Unknown);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_unparseable_environment_keeps_default() {
        let _guard = EnvGuard::set("BINFINDER_WORKERS", "many");

        let config = BinfinderConfig::default();
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn test_file_overlay() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("binfinder.toml");
        fs::write(
            &path,
            r#"
workers = 3
linux_fallback = "unknown"
sentinel_images = ["busybox", "scratch"]

[baseline]
common = ["/usr/bin/file", "/usr/local/bin/scanner"]
"#,
        )
        .unwrap();

        let mut config = BinfinderConfig::builtin();
        config.apply_file(&path).unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.linux_fallback, LinuxFallback::Unknown);
        assert_eq!(config.sentinel_images, vec!["busybox", "scratch"]);
        assert_eq!(config.baseline.common.len(), 2);
        // Lists missing from the [baseline] table keep their defaults
        assert_eq!(config.baseline.alpine, Baseline::default().alpine);
        assert_eq!(config.package_query_workers, DEFAULT_PACKAGE_QUERY_WORKERS);
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("binfinder.toml");
        fs::write(&path, "wokrers = 3\n").unwrap();

        let err = BinfinderConfig::builtin().apply_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = BinfinderConfig::builtin()
            .apply_file(Path::new("/nonexistent/binfinder.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: Vec<fn(&mut BinfinderConfig)> = vec![
            |c| c.workers = 0,
            |c| c.package_query_workers = 0,
            |c| c.command_timeout_secs = 0,
            |c| c.command_timeout_secs = MAX_COMMAND_TIMEOUT_SECS + 1,
            |c| c.runtime_binary = String::new(),
            |c| c.tooling_marker = "  ".to_string(),
            |c| c.log_level = "verbose".to_string(),
        ];

        for mutate in cases {
            let mut config = BinfinderConfig::builtin();
            mutate(&mut config);
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }
    }

    #[test]
    fn test_sentinel_matching() {
        let config = BinfinderConfig::builtin();

        assert!(config.is_sentinel(&ImageRef::new("busybox")));
        assert!(config.is_sentinel(&ImageRef::new("busybox:1.36")));
        assert!(!config.is_sentinel(&ImageRef::new("alpine:3.18")));
    }

    #[test]
    fn test_config_display() {
        let display = format!("{}", BinfinderConfig::builtin());
        assert!(display.contains("Binfinder Configuration:"));
        assert!(display.contains("Workers: 1"));
    }
}
