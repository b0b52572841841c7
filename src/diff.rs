//! Reconciliation of scanned executables against the package manifest

use crate::image::ImageRef;
use crate::manifest::ManifestSet;
use crate::os::OsFamily;
use crate::scanner::ScanRecord;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Paths introduced by the scanning tooling itself, always treated as owned.
///
/// `common` applies to every family. The per-family lists cover packages the
/// sweep scripts install that the image's own manifest does not declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Baseline {
    pub common: Vec<String>,
    pub alpine: Vec<String>,
    pub debian: Vec<String>,
    pub rhel: Vec<String>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            common: vec!["/usr/bin/file".to_string()],
            alpine: [
                "/usr/bin/find",
                "/usr/bin/xargs",
                "/usr/bin/updatedb",
                "/usr/bin/locate",
                "/usr/libexec/frcode",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            debian: Vec::new(),
            rhel: Vec::new(),
        }
    }
}

impl Baseline {
    pub fn for_family(&self, family: OsFamily) -> impl Iterator<Item = &str> {
        let specific: &[String] = match family {
            OsFamily::Alpine => &self.alpine,
            OsFamily::DebianLike => &self.debian,
            OsFamily::RhelLike => &self.rhel,
            OsFamily::Unknown => &[],
        };
        self.common.iter().chain(specific).map(String::as_str)
    }
}

/// Persisted per-image result.
///
/// Field names are part of the on-disk format shared with earlier releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    #[serde(rename = "ImageName")]
    pub image_name: ImageRef,

    /// Unaccounted executables, strictly ascending
    #[serde(rename = "ELFNames", default, deserialize_with = "null_as_empty")]
    pub elf_names: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Executables from `scan` that are neither in `manifest` nor in `allowlist`.
///
/// An empty manifest is not an error; the record then over-reports.
pub fn reconcile<'a>(
    image: &ImageRef,
    manifest: &ManifestSet,
    scan: &ScanRecord,
    allowlist: impl IntoIterator<Item = &'a str>,
) -> DiffRecord {
    let allowed: HashSet<&str> = allowlist.into_iter().collect();
    let mut seen = HashSet::new();
    let mut elf_names = Vec::new();

    for path in scan.executables() {
        let path = path.as_str();
        if manifest.contains(path) || allowed.contains(path) {
            continue;
        }
        if seen.insert(path) {
            elf_names.push(path.to_string());
        }
    }

    elf_names.sort();
    elf_names.dedup();

    DiffRecord {
        image_name: image.clone(),
        elf_names,
    }
}
