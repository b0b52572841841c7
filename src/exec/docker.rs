use super::runtime::DockerRuntime;
use super::{ExecutionPort, Invocation};
use crate::error::ExecError;
use crate::image::ImageRef;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Runs invocations through the container runtime CLI (`docker run ...`)
pub struct DockerCliExecutor {
    runtime_binary: String,
    timeout: Duration,
    runtime: Option<Arc<DockerRuntime>>,
}

impl DockerCliExecutor {
    pub fn new(runtime_binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runtime_binary: runtime_binary.into(),
            timeout,
            runtime: None,
        }
    }

    /// Pull images through the daemon API before they are probed
    pub fn with_runtime(mut self, runtime: Arc<DockerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Arguments passed to the runtime binary for one invocation
    pub fn run_args(&self, image: &ImageRef, invocation: &Invocation, name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-u".to_string(),
            "root".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        if let Some(mount) = &invocation.mount {
            args.push("-v".to_string());
            args.push(format!(
                "{}:{}:ro",
                mount.host_path.display(),
                mount.container_path
            ));
        }
        args.push("--entrypoint".to_string());
        args.push(invocation.entrypoint.clone());
        args.push(image.to_string());
        args.extend(invocation.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ExecutionPort for DockerCliExecutor {
    async fn prepare(&self, image: &ImageRef) -> Result<(), ExecError> {
        match &self.runtime {
            Some(runtime) => runtime.pull(image).await,
            None => Ok(()),
        }
    }

    async fn execute(&self, image: &ImageRef, invocation: &Invocation) -> Result<String, ExecError> {
        let name = format!("binfinder-{}", Uuid::new_v4().simple());
        let command = invocation.describe();
        debug!(image = %image, container = %name, command = %command, "Running in container");

        let mut guard = ContainerGuard::new(&self.runtime_binary, &name);
        let child = Command::new(&self.runtime_binary)
            .args(self.run_args(image, invocation, &name))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                guard.disarm();
                return Err(ExecError::Spawn {
                    runtime: self.runtime_binary.clone(),
                    source,
                });
            }
            Err(_) => {
                warn!(image = %image, command = %command, "Container call timed out");
                return Err(ExecError::Timeout {
                    command,
                    seconds: self.timeout.as_secs(),
                });
            }
        };
        guard.disarm();

        if !output.status.success() {
            return Err(ExecError::NonZeroExit {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Force-removes a named container unless the call that started it completed.
///
/// Killing the CLI client does not stop the container it started, so timeouts
/// and aborted tasks would otherwise leave sweeps running in the daemon.
struct ContainerGuard {
    runtime_binary: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime_binary: &str, name: &str) -> Self {
        Self {
            runtime_binary: runtime_binary.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(container = %self.name, "Removing abandoned container");
        // Spawned synchronously; the process may exit before a runtime task is polled
        if let Err(e) = std::process::Command::new(&self.runtime_binary)
            .args(["rm", "-f", self.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            warn!(container = %self.name, "Failed to remove container: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripts::{Script, ScriptSet};

    #[test]
    fn test_run_args_for_plain_command() {
        let executor = DockerCliExecutor::new("docker", Duration::from_secs(5));
        let args = executor.run_args(
            &ImageRef::new("alpine:3.10"),
            &Invocation::cat("/etc/os-release"),
            "binfinder-test",
        );

        assert_eq!(
            args,
            vec![
                "run",
                "-u",
                "root",
                "--rm",
                "--name",
                "binfinder-test",
                "--entrypoint",
                "cat",
                "alpine:3.10",
                "/etc/os-release",
            ]
        );
    }

    #[test]
    fn test_run_args_mount_script_read_only() {
        let executor = DockerCliExecutor::new("podman", Duration::from_secs(5));
        let scripts = ScriptSet::new("/srv/scripts");
        let args = executor.run_args(
            &ImageRef::new("centos:7"),
            &Invocation::script(&scripts, Script::RhelPackages),
            "binfinder-test",
        );

        let mount_idx = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(
            args[mount_idx + 1],
            "/srv/scripts/rhel-packages.sh:/binfinder/rhel-packages.sh:ro"
        );
        assert_eq!(&args[args.len() - 2..], ["centos:7", "/binfinder/rhel-packages.sh"]);
    }

    #[tokio::test]
    async fn test_missing_runtime_binary_is_spawn_error() {
        let executor = DockerCliExecutor::new(
            "/nonexistent/binfinder-runtime",
            Duration::from_secs(5),
        );
        let result = executor
            .execute(&ImageRef::new("alpine"), &Invocation::cat("/etc/os-release"))
            .await;

        assert!(matches!(result, Err(ExecError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_prepare_without_runtime_is_noop() {
        let executor = DockerCliExecutor::new("docker", Duration::from_secs(5));
        assert!(executor.prepare(&ImageRef::new("alpine")).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_call_removes_its_container() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let runtime = temp.path().join("fake-runtime");
        std::fs::write(
            &runtime,
            format!(
                "#!/bin/sh\necho \"$@\" >> {}\nif [ \"$1\" = run ]; then sleep 30; fi\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&runtime, std::fs::Permissions::from_mode(0o755)).unwrap();

        let executor = DockerCliExecutor::new(runtime.to_string_lossy(), Duration::from_secs(60));
        let image = ImageRef::new("alpine");
        let invocation = Invocation::cat("/etc/os-release");
        let call = executor.execute(&image, &invocation);
        assert!(timeout(Duration::from_millis(500), call).await.is_err());

        let mut lines = Vec::new();
        for _ in 0..50 {
            let content = std::fs::read_to_string(&log).unwrap_or_default();
            lines = content.lines().map(String::from).collect::<Vec<_>>();
            if lines.iter().any(|l| l.starts_with("rm -f ")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let name = lines
            .iter()
            .find_map(|l| l.split_whitespace().skip_while(|a| *a != "--name").nth(1))
            .unwrap()
            .to_string();
        assert!(name.starts_with("binfinder-"));
        assert!(lines.contains(&format!("rm -f {}", name)));
    }
}
