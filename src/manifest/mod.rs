//! Package-manager owned paths, one strategy per OS family
//!
//! apk, dpkg and rpm keep their databases in formats that share nothing, so the
//! abstraction boundary is "produce a [`ManifestSet`]" rather than "parse this
//! database". Callers never see the format differences.

mod alpine;
mod debian;
mod rhel;

pub use alpine::AlpineManifest;
pub use debian::DebianManifest;
pub use rhel::RhelManifest;

use crate::config::BinfinderConfig;
use crate::error::ReconcileError;
use crate::exec::ExecutionPort;
use crate::image::ImageRef;
use crate::os::OsFamily;
use crate::scripts::ScriptSet;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Deduplicated set of absolute paths owned by the package manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSet {
    paths: HashSet<String>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw owned-path entry; blank entries are ignored.
    /// Returns whether the normalized path was new.
    pub fn insert(&mut self, raw: &str) -> bool {
        match normalize_owned_path(raw) {
            Some(path) => self.paths.insert(path),
            None => false,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ManifestSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ManifestSet::new();
        set.extend(iter);
        set
    }
}

impl<S: AsRef<str>> Extend<S> for ManifestSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for raw in iter {
            self.insert(raw.as_ref());
        }
    }
}

/// Trims an owned-path entry and gives it a leading `/`
pub fn normalize_owned_path(raw: &str) -> Option<String> {
    let path = raw.trim();
    if path.is_empty() {
        return None;
    }
    if path.starts_with('/') {
        Some(path.to_string())
    } else {
        Some(format!("/{}", path))
    }
}

/// Parses package-manager file listings (`apk info -L`, the rpm listing script).
///
/// Drops blank lines and `<package> contains:` headers.
pub fn parse_owned_path_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.ends_with("contains:"))
        .filter_map(normalize_owned_path)
        .collect()
}

#[async_trait]
pub trait ManifestProvider: Send + Sync {
    fn family(&self) -> OsFamily;

    /// Every path the image's package manager claims to own
    async fn owned_paths(&self, image: &ImageRef) -> Result<ManifestSet, ReconcileError>;
}

/// Looks up the [`ManifestProvider`] for a classified image
pub struct ManifestRegistry {
    alpine: Arc<dyn ManifestProvider>,
    debian: Arc<dyn ManifestProvider>,
    rhel: Arc<dyn ManifestProvider>,
}

impl ManifestRegistry {
    pub fn new(
        executor: Arc<dyn ExecutionPort>,
        scripts: &ScriptSet,
        config: &BinfinderConfig,
    ) -> Self {
        Self {
            alpine: Arc::new(AlpineManifest::new(
                executor.clone(),
                config.package_query_workers,
            )),
            debian: Arc::new(DebianManifest::new(executor.clone())),
            rhel: Arc::new(RhelManifest::new(executor, scripts.clone())),
        }
    }

    pub fn provider_for(&self, family: OsFamily) -> Option<Arc<dyn ManifestProvider>> {
        match family {
            OsFamily::Alpine => Some(self.alpine.clone()),
            OsFamily::DebianLike => Some(self.debian.clone()),
            OsFamily::RhelLike => Some(self.rhel.clone()),
            OsFamily::Unknown => None,
        }
    }
}
