//! Discovery of images to audit from a public hub or a private registry
//!
//! Three interchangeable [`ImageProvider`]s share one contract: return up to
//! `top` image references, in the order the remote service lists them.

mod docker_hub;
mod dtr;
mod registry_v2;

pub use docker_hub::DockerHubProvider;
pub use dtr::DtrProvider;
pub use registry_v2::RegistryV2Provider;

use crate::exec::RegistryCredentials;
use crate::image::ImageRef;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Timeout applied to every discovery request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Up to `top` references; `all_tags` asks for every tag of a repository
    /// where the provider would otherwise pick one
    async fn popular_images(&self, top: usize, all_tags: bool)
        -> Result<Vec<ImageRef>, DiscoveryError>;
}

fn http_client(accept_invalid_certs: bool) -> Result<Client, DiscoveryError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(DiscoveryError::Client)
}

fn with_auth(request: RequestBuilder, credentials: Option<&RegistryCredentials>) -> RequestBuilder {
    match credentials {
        Some(c) => request.basic_auth(&c.username, Some(&c.password)),
        None => request,
    }
}

async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T, DiscoveryError> {
    debug!(url = %url, "Fetching");
    let http_error = |source: reqwest::Error| DiscoveryError::Http {
        url: url.to_string(),
        source,
    };

    let response = request
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(http_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(DiscoveryError::Status {
            url: url.to_string(),
            status,
        });
    }

    response.json::<T>().await.map_err(http_error)
}

/// Registry host as it appears in an image reference
pub fn strip_scheme(host: &str) -> &str {
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.trim_end_matches('/')
}
