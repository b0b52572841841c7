use super::{get_json, http_client, strip_scheme, with_auth, DiscoveryError, ImageProvider};
use crate::exec::RegistryCredentials;
use crate::image::ImageRef;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Every tag of every repository in a Docker Registry HTTP API v2 catalog
pub struct RegistryV2Provider {
    client: Client,
    host: String,
    credentials: Option<RegistryCredentials>,
}

impl RegistryV2Provider {
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

    async fn tags(&self, repository: &str) -> Result<Vec<String>, DiscoveryError> {
        let url = format!("{}/v2/{}/tags/list", self.host, repository);
        let request = with_auth(self.client.get(&url), self.credentials.as_ref());
        let list: TagList = get_json(request, &url).await?;
        Ok(list.tags.unwrap_or_default())
    }
}

fn qualify(registry: &str, repository: &str, tag: &str) -> ImageRef {
    ImageRef::new(format!("{}/{}:{}", registry, repository, tag))
}

#[async_trait]
impl ImageProvider for RegistryV2Provider {
    fn name(&self) -> &'static str {
        "registry-v2"
    }

    // The catalog carries no push times to pick a single tag by, so every tag is listed.
    async fn popular_images(
        &self,
        top: usize,
        _all_tags: bool,
    ) -> Result<Vec<ImageRef>, DiscoveryError> {
        let url = format!("{}/v2/_catalog", self.host);
        let request = with_auth(self.client.get(&url), self.credentials.as_ref());
        let catalog: Catalog = get_json(request, &url).await?;
        info!(url = %url, repositories = catalog.repositories.len(), "Fetched catalog");

        let registry = strip_scheme(&self.host);
        let mut result = Vec::new();
        for repository in &catalog.repositories {
            let tags = match self.tags(repository).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(repository = %repository, "Failed to fetch tags: {}", e);
                    continue;
                }
            };
            for tag in tags {
                if result.len() >= top {
                    return Ok(result);
                }
                result.push(qualify(registry, repository, &tag));
            }
        }

        Ok(result)
    }
}
