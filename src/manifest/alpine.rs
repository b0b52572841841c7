use super::{parse_owned_path_listing, ManifestProvider, ManifestSet};
use crate::error::ReconcileError;
use crate::exec::{ExecutionPort, Invocation};
use crate::image::ImageRef;
use crate::os::OsFamily;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

pub const APK_DATABASE_PATH: &str = "/lib/apk/db/installed";

/// apk strategy: read the installed database, then ask `apk info -L` for each
/// package's file list.
///
/// Per-package queries fan out as tasks bounded by a semaphore shared by every
/// Alpine image in the run. Their results fan in through one channel drained
/// by a single collector, so the merged set has exactly one writer.
pub struct AlpineManifest {
    executor: Arc<dyn ExecutionPort>,
    query_limit: Arc<Semaphore>,
}

impl AlpineManifest {
    pub fn new(executor: Arc<dyn ExecutionPort>, max_concurrent_queries: usize) -> Self {
        Self {
            executor,
            query_limit: Arc::new(Semaphore::new(max_concurrent_queries.max(1))),
        }
    }
}

/// Package names from `P:` (name) and `o:` (origin) records of the apk database
pub fn parse_installed_packages(database: &str) -> BTreeSet<String> {
    database
        .lines()
        .filter_map(|line| {
            line.strip_prefix("P:")
                .or_else(|| line.strip_prefix("o:"))
        })
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

// A failed query contributes nothing; origins that are not installed packages fail here routinely.
async fn query_package(executor: &dyn ExecutionPort, image: &ImageRef, package: &str) -> Vec<String> {
    let invocation = Invocation::command("apk", ["info", "-L", package]);
    match executor.execute(image, &invocation).await {
        Ok(output) => parse_owned_path_listing(&output),
        Err(e) => {
            debug!(image = %image, package = %package, "Package file query failed: {}", e);
            Vec::new()
        }
    }
}

#[async_trait]
impl ManifestProvider for AlpineManifest {
    fn family(&self) -> OsFamily {
        OsFamily::Alpine
    }

    async fn owned_paths(&self, image: &ImageRef) -> Result<ManifestSet, ReconcileError> {
        let started = Instant::now();
        let database = self
            .executor
            .execute(image, &Invocation::cat(APK_DATABASE_PATH))
            .await
            .map_err(|source| ReconcileError::Manifest {
                image: image.clone(),
                source,
            })?;

        let packages = parse_installed_packages(&database);
        debug!(image = %image, packages = packages.len(), "Querying apk package contents");

        let (tx, mut rx) = mpsc::channel::<Vec<String>>(packages.len().max(1));
        let mut queries = JoinSet::new();
        for package in packages {
            let tx = tx.clone();
            let executor = self.executor.clone();
            let limit = self.query_limit.clone();
            let image = image.clone();
            queries.spawn(async move {
                let files = match limit.acquire_owned().await {
                    Ok(_permit) => query_package(executor.as_ref(), &image, &package).await,
                    Err(_) => Vec::new(),
                };
                let _ = tx.send(files).await;
            });
        }
        drop(tx);

        let mut manifest = ManifestSet::new();
        while let Some(files) = rx.recv().await {
            manifest.extend(files);
        }
        // Every sender is gone, so all queries have finished
        while queries.join_next().await.is_some() {}

        info!(
            image = %image,
            owned_paths = manifest.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Collected apk manifest"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockExecutor;
    use std::time::Duration;

    const INSTALLED_DB: &str = "C:Q1abc=\nP:musl\nV:1.1.22-r3\no:musl\n\nC:Q1def=\nP:findutils\nV:4.6.0-r1\no:findutils\n\nP:libcrypto1.1\no:openssl\n";

    #[test]
    fn test_parse_installed_packages() {
        let packages = parse_installed_packages(INSTALLED_DB);
        let names: Vec<&str> = packages.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["findutils", "libcrypto1.1", "musl", "openssl"]);
    }

    #[test]
    fn test_parse_ignores_short_and_blank_records() {
        assert!(parse_installed_packages("P\nP:\no: \nV:1.0\n").is_empty());
    }

    #[tokio::test]
    async fn test_owned_paths_merges_package_listings() {
        let mock = Arc::new(MockExecutor::new());
        let image = "alpine:3.10";
        mock.respond(image, "cat /lib/apk/db/installed", INSTALLED_DB);
        mock.respond(
            image,
            "apk info -L musl",
            "musl-1.1.22-r3 contains:\nlib/libc.musl-x86_64.so.1\nlib/ld-musl-x86_64.so.1\n",
        );
        mock.respond(
            image,
            "apk info -L findutils",
            "findutils-4.6.0-r1 contains:\nusr/bin/find\nusr/bin/xargs\nusr/bin/locate\nusr/libexec/frcode\n",
        );
        mock.respond(
            image,
            "apk info -L libcrypto1.1",
            "libcrypto1.1-1.1.1k-r0 contains:\nlib/libcrypto.so.1.1\n",
        );
        // "openssl" is only an origin here, so its query fails and is tolerated

        let provider = AlpineManifest::new(mock.clone(), 4);
        let manifest = provider.owned_paths(&ImageRef::new(image)).await.unwrap();

        assert_eq!(manifest.len(), 7);
        assert!(manifest.contains("/usr/bin/find"));
        assert!(manifest.contains("/lib/libcrypto.so.1.1"));
        assert_eq!(mock.calls_for(image).len(), 5);
    }

    #[tokio::test]
    async fn test_owned_paths_fails_without_database() {
        let mock = Arc::new(MockExecutor::new());
        let provider = AlpineManifest::new(mock, 4);

        let err = provider
            .owned_paths(&ImageRef::new("alpine:edge"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Manifest { .. }));
    }

    #[tokio::test]
    async fn test_package_queries_respect_bound() {
        let mock = Arc::new(MockExecutor::new().with_delay(Duration::from_millis(20)));
        let image = "alpine:3.18";
        let database: String = (0..12).map(|i| format!("P:pkg{}\n", i)).collect();
        mock.respond(image, "cat /lib/apk/db/installed", &database);
        for i in 0..12 {
            mock.respond(image, &format!("apk info -L pkg{}", i), &format!("usr/bin/tool{}\n", i));
        }

        let provider = AlpineManifest::new(mock.clone(), 3);
        let manifest = provider.owned_paths(&ImageRef::new(image)).await.unwrap();

        assert_eq!(manifest.len(), 12);
        assert!(mock.max_in_flight() <= 3);
    }
}
