use super::{get_json, http_client, DiscoveryError, ImageProvider};
use crate::image::ImageRef;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

pub const DOCKER_HUB_URL: &str = "https://hub.docker.com";

const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct RepositoryPage {
    #[serde(default)]
    results: Vec<NamedEntry>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagPage {
    #[serde(default)]
    results: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

/// Official images from Docker Hub, in the order the hub ranks them
pub struct DockerHubProvider {
    client: Client,
    base_url: String,
}

impl DockerHubProvider {
    pub fn new() -> Result<Self, DiscoveryError> {
        Self::with_base_url(DOCKER_HUB_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DiscoveryError> {
        Ok(Self {
            client: http_client(false)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn first_page_url(&self) -> String {
        format!(
            "{}/v2/repositories/library/?page=1&page_size={}",
            self.base_url, PAGE_SIZE
        )
    }

    fn tags_url(&self, repository: &str) -> String {
        format!(
            "{}/v2/repositories/library/{}/tags",
            self.base_url,
            repository.to_lowercase()
        )
    }

    async fn tags(&self, repository: &str, all_tags: bool) -> Result<Vec<String>, DiscoveryError> {
        let url = self.tags_url(repository);
        let page: TagPage = get_json(self.client.get(&url), &url).await?;
        Ok(select_tags(
            page.results.into_iter().map(|t| t.name).collect(),
            all_tags,
        ))
    }
}

/// First listed tag, or all of them
fn select_tags(mut tags: Vec<String>, all_tags: bool) -> Vec<String> {
    if !all_tags {
        tags.truncate(1);
    }
    tags
}

/// Appends `name:tag` references until `top` is reached; returns whether it was
fn push_references(result: &mut Vec<ImageRef>, name: &str, tags: &[String], top: usize) -> bool {
    for tag in tags {
        if result.len() >= top {
            return true;
        }
        result.push(ImageRef::new(format!("{}:{}", name, tag)));
    }
    result.len() >= top
}

#[async_trait]
impl ImageProvider for DockerHubProvider {
    fn name(&self) -> &'static str {
        "docker-hub"
    }

    async fn popular_images(
        &self,
        top: usize,
        all_tags: bool,
    ) -> Result<Vec<ImageRef>, DiscoveryError> {
        let mut result = Vec::new();
        if top == 0 {
            return Ok(result);
        }

        let mut next = Some(self.first_page_url());
        while let Some(url) = next {
            let page: RepositoryPage = get_json(
                self.client.get(&url).header("Search-Version", "v3"),
                &url,
            )
            .await?;
            info!(url = %url, repositories = page.results.len(), "Fetched repository page");

            for repository in &page.results {
                let tags = match self.tags(&repository.name, all_tags).await {
                    Ok(tags) if !tags.is_empty() => tags,
                    Ok(_) => {
                        warn!(repository = %repository.name, "Repository has no tags");
                        continue;
                    }
                    Err(e) => {
                        warn!(repository = %repository.name, "Failed to fetch tags: {}", e);
                        continue;
                    }
                };
                if push_references(&mut result, &repository.name, &tags, top) {
                    return Ok(result);
                }
            }

            next = page.next.filter(|n| !n.is_empty());
        }

        Ok(result)
    }
}
