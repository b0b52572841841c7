use super::{get_json, http_client, strip_scheme, with_auth, DiscoveryError, ImageProvider};
use crate::exec::RegistryCredentials;
use crate::image::ImageRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

const FALLBACK_TAG: &str = "latest";

#[derive(Debug, Deserialize)]
struct RepositoryList {
    #[serde(default)]
    repositories: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    namespace: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DtrTag {
    name: String,
    #[serde(default)]
    updated_at: String,
}

/// Repositories of a Docker Trusted Registry, each at its most recently pushed tag
pub struct DtrProvider {
    client: Client,
    host: String,
    credentials: Option<RegistryCredentials>,
}

impl DtrProvider {
    pub fn new(
        host: impl Into<String>,
        credentials: Option<RegistryCredentials>,
        insecure: bool,
    ) -> Result<Self, DiscoveryError> {
        Ok(Self {
            client: http_client(insecure)?,
            host: host.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn newest_tag(&self, repository: &Repository) -> Result<String, DiscoveryError> {
        let url = format!(
            "{}/api/v0/repositories/{}/{}/tags",
            self.host, repository.namespace, repository.name
        );
        let request = with_auth(self.client.get(&url), self.credentials.as_ref());
        let tags: Vec<DtrTag> = get_json(request, &url).await?;
        Ok(newest_tag(&tags))
    }
}

/// Tag with the latest RFC 3339 `updatedAt`; unparseable timestamps never win
fn newest_tag(tags: &[DtrTag]) -> String {
    tags.iter()
        .filter_map(|tag| {
            DateTime::parse_from_rfc3339(&tag.updated_at)
                .ok()
                .map(|at| (at.with_timezone(&Utc), tag.name.as_str()))
        })
        .max_by_key(|(at, _)| *at)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| FALLBACK_TAG.to_string())
}

#[async_trait]
impl ImageProvider for DtrProvider {
    fn name(&self) -> &'static str {
        "dtr"
    }

    async fn popular_images(
        &self,
        top: usize,
        _all_tags: bool,
    ) -> Result<Vec<ImageRef>, DiscoveryError> {
        let url = format!("{}/api/v0/repositories", self.host);
        let request = with_auth(self.client.get(&url), self.credentials.as_ref());
        let list: RepositoryList = get_json(request, &url).await?;
        info!(url = %url, repositories = list.repositories.len(), "Fetched repository list");

        let registry = strip_scheme(&self.host);
        let mut result = Vec::new();
        for repository in list.repositories.iter().take(top) {
            let tag = match self.newest_tag(repository).await {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(
                        namespace = %repository.namespace,
                        repository = %repository.name,
                        "Failed to fetch tags, using {}: {}",
                        FALLBACK_TAG,
                        e
                    );
                    FALLBACK_TAG.to_string()
                }
            };
            result.push(ImageRef::new(format!(
                "{}/{}/{}:{}",
                registry, repository.namespace, repository.name, tag
            )));
        }

        Ok(result)
    }
}
