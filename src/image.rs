//! Image identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque image identifier with an optional tag, e.g. `alpine:3.10` or
/// `registry.local:5000/team/app:1.2`. Never mutated once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Repository part of the reference, without tag or digest
    pub fn name(&self) -> &str {
        if let Some((name, _)) = self.0.split_once('@') {
            return name;
        }
        match self.tag_separator() {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// Tag part of the reference; `None` for untagged and digest references
    pub fn tag(&self) -> Option<&str> {
        if self.0.contains('@') {
            return None;
        }
        self.tag_separator().map(|idx| &self.0[idx + 1..])
    }

    /// File name of the persisted diff record for this image
    pub fn diff_file_name(&self) -> String {
        format!("{}-diff.json", self.0.replace('/', "-"))
    }

    // Only a colon after the last slash separates a tag; earlier ones belong to a registry port.
    fn tag_separator(&self) -> Option<usize> {
        let last_slash = self.0.rfind('/').map(|i| i + 1).unwrap_or(0);
        self.0[last_slash..].rfind(':').map(|i| last_slash + i)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ImageRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parses a comma separated image list, dropping blank entries
pub fn parse_image_list(list: &str) -> Vec<ImageRef> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ImageRef::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { "alpine", "alpine", None },
        tagged = { "alpine:3.10", "alpine", Some("3.10") },
        namespaced = { "library/ubuntu:xenial", "library/ubuntu", Some("xenial") },
        registry_port = { "registry.local:5000/team/app", "registry.local:5000/team/app", None },
        registry_port_tagged = { "registry.local:5000/team/app:1.2", "registry.local:5000/team/app", Some("1.2") },
        digest = { "alpine@sha256:abcd", "alpine", None },
    )]
    fn test_name_and_tag(reference: &str, name: &str, tag: Option<&str>) {
        let image = ImageRef::new(reference);
        assert_eq!(image.name(), name);
        assert_eq!(image.tag(), tag);
    }

    #[test]
    fn test_diff_file_name_replaces_separators() {
        let image = ImageRef::new("quay.io/prometheus/node-exporter:v1.7.0");
        assert_eq!(
            image.diff_file_name(),
            "quay.io-prometheus-node-exporter:v1.7.0-diff.json"
        );
        assert_eq!(ImageRef::new("nginx:1.25").diff_file_name(), "nginx:1.25-diff.json");
    }

    #[test]
    fn test_parse_image_list() {
        let images = parse_image_list("alpine:3.10, ubuntu:xenial,,centos:7 ,");
        let names: Vec<&str> = images.iter().map(ImageRef::as_str).collect();
        assert_eq!(names, vec!["alpine:3.10", "ubuntu:xenial", "centos:7"]);
        assert!(parse_image_list("  ").is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&ImageRef::new("redis:7")).unwrap();
        assert_eq!(json, "\"redis:7\"");
    }
}
