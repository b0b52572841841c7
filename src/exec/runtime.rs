use crate::error::ExecError;
use crate::image::ImageRef;
use bollard::auth::DockerCredentials;
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::fmt;
use tracing::{debug, info};

/// Registry login used when pulling private images
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub server: Option<String>,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// Daemon-level operations that do not run commands: health checks and pulls
pub struct DockerRuntime {
    docker: Docker,
    credentials: Option<RegistryCredentials>,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, ExecError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ExecError::Other(format!("failed to connect to container daemon: {}", e)))?;
        Ok(Self {
            docker,
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, credentials: Option<RegistryCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Whether the daemon answers API calls
    pub async fn is_available(&self) -> bool {
        match self.docker.version().await {
            Ok(v) => {
                debug!(
                    api_version = v.api_version.as_deref().unwrap_or("unknown"),
                    "Container daemon reachable"
                );
                true
            }
            Err(e) => {
                debug!("Failed to get daemon version: {}", e);
                false
            }
        }
    }

    pub async fn pull(&self, image: &ImageRef) -> Result<(), ExecError> {
        let (from_image, tag) = pull_reference(image);
        info!(image = %image, "Pulling image");

        let options = CreateImageOptions {
            from_image: from_image.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        let credentials = self.credentials.as_ref().map(|c| DockerCredentials {
            username: Some(c.username.clone()),
            password: Some(c.password.clone()),
            serveraddress: c.server.clone(),
            ..Default::default()
        });

        let mut progress = self.docker.create_image(Some(options), None, credentials);
        while let Some(update) = progress.next().await {
            match update {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %image, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(ExecError::Pull {
                        image: image.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }

        debug!(image = %image, "Pulled image");
        Ok(())
    }
}

// An empty tag makes the daemon pull every tag, so untagged references get `latest`.
fn pull_reference(image: &ImageRef) -> (&str, &str) {
    match image.tag() {
        Some(tag) => (image.name(), tag),
        None if image.as_str().contains('@') => (image.as_str(), ""),
        None => (image.name(), "latest"),
    }
}
