//! Execution port: running one command inside an ephemeral container
//!
//! Everything above this module talks to the container runtime only through
//! [`ExecutionPort`], which keeps the pipeline testable with [`MockExecutor`].

mod docker;
mod mock;
mod runtime;

pub use docker::DockerCliExecutor;
pub use mock::MockExecutor;
pub use runtime::{DockerRuntime, RegistryCredentials};

use crate::error::ExecError;
use crate::image::ImageRef;
use crate::scripts::{Script, ScriptSet};
use async_trait::async_trait;
use std::path::PathBuf;

/// A fixed, parameterized command run as root with an overridden entrypoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub entrypoint: String,
    pub args: Vec<String>,
    /// Host script bind-mounted into the container, with its mount point
    pub mount: Option<ScriptMount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptMount {
    pub host_path: PathBuf,
    pub container_path: String,
}

impl Invocation {
    pub fn command<I, S>(entrypoint: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entrypoint: entrypoint.into(),
            args: args.into_iter().map(Into::into).collect(),
            mount: None,
        }
    }

    /// `cat <path>` inside the image
    pub fn cat(path: impl Into<String>) -> Self {
        Self::command("cat", [path.into()])
    }

    /// Runs a companion script with `sh`
    pub fn script(scripts: &ScriptSet, script: Script) -> Self {
        let container_path = script.container_path();
        Self {
            entrypoint: "sh".to_string(),
            args: vec![container_path.clone()],
            mount: Some(ScriptMount {
                host_path: scripts.path(script),
                container_path,
            }),
        }
    }

    /// The command as seen inside the container, e.g. `apk info -L musl`
    pub fn describe(&self) -> String {
        if self.args.is_empty() {
            self.entrypoint.clone()
        } else {
            format!("{} {}", self.entrypoint, self.args.join(" "))
        }
    }
}

#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Makes the image available to subsequent `execute` calls
    async fn prepare(&self, _image: &ImageRef) -> Result<(), ExecError> {
        Ok(())
    }

    /// Runs `invocation` in a fresh container of `image` and returns its stdout
    async fn execute(&self, image: &ImageRef, invocation: &Invocation) -> Result<String, ExecError>;
}
