use super::{ManifestProvider, ManifestSet};
use crate::error::ReconcileError;
use crate::exec::{ExecutionPort, Invocation};
use crate::image::ImageRef;
use crate::os::OsFamily;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DPKG_INFO_DIR: &str = "/var/lib/dpkg/info";

/// Suffix of dpkg's per-package file lists
pub const MANIFEST_SUFFIX: &str = ".list";

// Keeps each `cat` well under the kernel's argument size limit
const FILES_PER_READ: usize = 200;

/// dpkg strategy: union every line of every `*.list` file in the dpkg info
/// directory. The lists are mandatory, so any unreadable one fails the image.
pub struct DebianManifest {
    executor: Arc<dyn ExecutionPort>,
}

impl DebianManifest {
    pub fn new(executor: Arc<dyn ExecutionPort>) -> Self {
        Self { executor }
    }

    fn manifest_error(image: &ImageRef, source: crate::error::ExecError) -> ReconcileError {
        ReconcileError::Manifest {
            image: image.clone(),
            source,
        }
    }
}

/// Manifest file names from a directory listing of the dpkg info directory
pub fn manifest_files(listing: &str) -> Vec<String> {
    let mut files: Vec<String> = listing
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.ends_with(MANIFEST_SUFFIX))
        .map(str::to_string)
        .collect();
    files.sort();
    files.dedup();
    files
}

#[async_trait]
impl ManifestProvider for DebianManifest {
    fn family(&self) -> OsFamily {
        OsFamily::DebianLike
    }

    async fn owned_paths(&self, image: &ImageRef) -> Result<ManifestSet, ReconcileError> {
        let started = Instant::now();
        let listing = self
            .executor
            .execute(image, &Invocation::command("ls", [format!("{}/", DPKG_INFO_DIR)]))
            .await
            .map_err(|e| Self::manifest_error(image, e))?;

        let files = manifest_files(&listing);
        debug!(image = %image, manifests = files.len(), "Reading dpkg file lists");

        let mut manifest = ManifestSet::new();
        for chunk in files.chunks(FILES_PER_READ) {
            let paths: Vec<String> = chunk
                .iter()
                .map(|name| format!("{}/{}", DPKG_INFO_DIR, name))
                .collect();
            let content = self
                .executor
                .execute(image, &Invocation::command("cat", paths))
                .await
                .map_err(|e| Self::manifest_error(image, e))?;
            manifest.extend(content.lines());
        }

        info!(
            image = %image,
            owned_paths = manifest.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Collected dpkg manifest"
        );
        Ok(manifest)
    }
}
