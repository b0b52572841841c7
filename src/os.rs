//! OS family classification
//!
//! An image is probed once by reading its release descriptor; the first line is
//! matched against family keywords in a fixed priority order:
//!
//! 1. `alpine` → [`OsFamily::Alpine`]
//! 2. `ubuntu`, `debian` → [`OsFamily::DebianLike`]
//! 3. `centos` → [`OsFamily::RhelLike`]
//! 4. bare `linux` → whatever [`LinuxFallback`] says
//!
//! Anything else is [`OsFamily::Unknown`] and the image is skipped.

use crate::error::{ExecError, ReconcileError};
use crate::exec::{ExecutionPort, Invocation};
use crate::image::ImageRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Generic release descriptor present on most distributions
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Fallback descriptor for CentOS 6, which predates `/etc/os-release`
pub const CENTOS_RELEASE_PATH: &str = "/etc/centos-release";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsFamily {
    Alpine,
    DebianLike,
    RhelLike,
    Unknown,
}

impl OsFamily {
    pub fn name(&self) -> &'static str {
        match self {
            OsFamily::Alpine => "alpine",
            OsFamily::DebianLike => "debian-like",
            OsFamily::RhelLike => "rhel-like",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Routing for distributions that only match the generic word `linux`.
///
/// `RhelLike` sends them through the RPM scripts, which covers Fedora, Amazon
/// Linux and similar. Whether unrecognised distributions should instead be
/// skipped is an open product decision, so both behaviours are selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinuxFallback {
    #[default]
    #[serde(alias = "rhel")]
    RhelLike,
    Unknown,
}

impl FromStr for LinuxFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rhel" | "rhel-like" => Ok(LinuxFallback::RhelLike),
            "unknown" | "skip" => Ok(LinuxFallback::Unknown),
            other => Err(format!(
                "invalid linux fallback '{}', expected 'rhel' or 'unknown'",
                other
            )),
        }
    }
}

/// Maps the first line of a release descriptor to an [`OsFamily`]
pub fn classify_release(first_line: &str, fallback: LinuxFallback) -> OsFamily {
    let line = first_line.to_lowercase();

    if line.contains("alpine") {
        OsFamily::Alpine
    } else if line.contains("ubuntu") || line.contains("debian") {
        OsFamily::DebianLike
    } else if line.contains("centos") {
        OsFamily::RhelLike
    } else if line.contains("linux") {
        match fallback {
            LinuxFallback::RhelLike => OsFamily::RhelLike,
            LinuxFallback::Unknown => OsFamily::Unknown,
        }
    } else {
        OsFamily::Unknown
    }
}

pub struct OsClassifier {
    executor: Arc<dyn ExecutionPort>,
    fallback: LinuxFallback,
}

impl OsClassifier {
    pub fn new(executor: Arc<dyn ExecutionPort>, fallback: LinuxFallback) -> Self {
        Self { executor, fallback }
    }

    /// Reads the image's release descriptor and classifies it.
    ///
    /// Fails with [`ReconcileError::Probe`] only when neither descriptor can be read.
    pub async fn classify(&self, image: &ImageRef) -> Result<OsFamily, ReconcileError> {
        let first_line = self.release_line(image).await.map_err(|source| {
            ReconcileError::Probe {
                image: image.clone(),
                source,
            }
        })?;

        let family = classify_release(&first_line, self.fallback);
        debug!(image = %image, release = %first_line, family = %family, "Classified image");
        Ok(family)
    }

    async fn release_line(&self, image: &ImageRef) -> Result<String, ExecError> {
        let output = match self
            .executor
            .execute(image, &Invocation::cat(OS_RELEASE_PATH))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                debug!(image = %image, "No {}: {}", OS_RELEASE_PATH, e);
                self.executor
                    .execute(image, &Invocation::cat(CENTOS_RELEASE_PATH))
                    .await?
            }
        };

        Ok(output.lines().next().unwrap_or_default().trim().to_string())
    }
}
