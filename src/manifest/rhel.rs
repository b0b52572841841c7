use super::{parse_owned_path_listing, ManifestProvider, ManifestSet};
use crate::error::{ExecError, ReconcileError};
use crate::exec::{ExecutionPort, Invocation};
use crate::image::ImageRef;
use crate::os::OsFamily;
use crate::scripts::{Script, ScriptSet};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// rpm strategy: the bundled listing script walks the rpm database inside the
/// container and prints one owned path per line.
pub struct RhelManifest {
    executor: Arc<dyn ExecutionPort>,
    scripts: ScriptSet,
}

impl RhelManifest {
    pub fn new(executor: Arc<dyn ExecutionPort>, scripts: ScriptSet) -> Self {
        Self { executor, scripts }
    }
}

#[async_trait]
impl ManifestProvider for RhelManifest {
    fn family(&self) -> OsFamily {
        OsFamily::RhelLike
    }

    async fn owned_paths(&self, image: &ImageRef) -> Result<ManifestSet, ReconcileError> {
        let started = Instant::now();
        let manifest_error = |source: ExecError| ReconcileError::Manifest {
            image: image.clone(),
            source,
        };
        let output = self
            .executor
            .execute(image, &Invocation::script(&self.scripts, Script::RhelPackages))
            .await
            .map_err(manifest_error)?;

        let manifest: ManifestSet = parse_owned_path_listing(&output).into_iter().collect();
        if manifest.is_empty() {
            return Err(manifest_error(ExecError::Other(
                "rpm database listed no owned paths".to_string(),
            )));
        }
        info!(
            image = %image,
            owned_paths = manifest.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Collected rpm manifest"
        );
        Ok(manifest)
    }
}
