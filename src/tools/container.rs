//! Container runtime seam for the annotation tools.
//!
//! The production runtime shells out to a docker-compatible CLI
//! (`docker`, `podman`). The pipeline only depends on `ContainerRuntime`,
//! so tests can stand in a runtime that writes canned tool output.

use crate::PlasticomeError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// A fully resolved container run
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInvocation {
    pub image: String,
    /// Local directory bound into the container
    pub mount_source: PathBuf,
    /// Path of the bind mount inside the container
    pub mount_target: String,
    pub volume_mode: String,
    pub working_dir: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ContainerInvocation {
    /// Arguments for `<runtime> run ...`
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!(
                "{}:{}:{}",
                self.mount_source.display(),
                self.mount_target,
                self.volume_mode
            ),
            "-w".to_string(),
            self.working_dir.clone(),
            self.image.clone(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }

    /// Host path for a container-side path argument inside the bind mount.
    /// Relative arguments are resolved against the container working dir.
    pub fn host_path(&self, container_path: &str) -> Option<PathBuf> {
        let absolute = if container_path.starts_with('/') {
            PathBuf::from(container_path)
        } else {
            PathBuf::from(&self.working_dir).join(container_path.trim_start_matches("./"))
        };
        let relative = absolute.strip_prefix(&self.mount_target).ok()?;
        Some(self.mount_source.join(relative))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContainerOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run to completion. Non-zero exit, launch failure and timeout are errors.
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput, PlasticomeError>;

    fn name(&self) -> &str;
}

/// Docker-compatible command line runtime
pub struct CliRuntime {
    binary: PathBuf,
}

impl CliRuntime {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput, PlasticomeError> {
        let args = invocation.cli_args();
        debug!(runtime = %self.binary.display(), ?args, "Starting container");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PlasticomeError::Tool(format!(
                    "failed to launch {} for {}: {}",
                    self.binary.display(),
                    invocation.image,
                    e
                ))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = tokio::time::timeout(invocation.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                PlasticomeError::Tool(format!(
                    "{} timed out after {}s",
                    invocation.image,
                    invocation.timeout.as_secs()
                ))
            })?
            .map_err(|e| PlasticomeError::Tool(format!("{} failed: {}", invocation.image, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(PlasticomeError::Tool(format!(
                "{} exited with {}: {}",
                invocation.image,
                output.status,
                stderr.trim()
            )));
        }

        Ok(ContainerOutput { stdout, stderr })
    }

    fn name(&self) -> &str {
        self.binary.to_str().unwrap_or("container-cli")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn invocation(mount: &Path, timeout: Duration) -> ContainerInvocation {
        ContainerInvocation {
            image: "haidyi/run_dbcan:latest".to_string(),
            mount_source: mount.to_path_buf(),
            mount_target: "/app/input".to_string(),
            volume_mode: "rw".to_string(),
            working_dir: "/app".to_string(),
            args: vec!["./input/genome.faa".to_string(), "protein".to_string()],
            timeout,
        }
    }

    #[test]
    fn test_cli_args_layout() {
        let args = invocation(Path::new("/work/r1/input"), Duration::from_secs(1)).cli_args();
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-v",
                "/work/r1/input:/app/input:rw",
                "-w",
                "/app",
                "haidyi/run_dbcan:latest",
                "./input/genome.faa",
                "protein",
            ]
        );
    }

    #[test]
    fn test_host_path_maps_into_mount() {
        let inv = invocation(Path::new("/work/r1/input"), Duration::from_secs(1));
        assert_eq!(
            inv.host_path("./input/genome_dbcan_output"),
            Some(PathBuf::from("/work/r1/input/genome_dbcan_output"))
        );
        assert_eq!(
            inv.host_path("/app/input/genome.faa"),
            Some(PathBuf::from("/work/r1/input/genome.faa"))
        );
        assert_eq!(inv.host_path("/temp"), None);
    }

    #[tokio::test]
    async fn test_missing_runtime_binary_is_tool_error() {
        let runtime = CliRuntime::new("/nonexistent/plasticome-docker");
        let err = runtime
            .run(&invocation(Path::new("/tmp"), Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PlasticomeError::Tool(_)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-docker");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_runtime_receives_arguments() {
            let dir = TempDir::new().unwrap();
            let log = dir.path().join("args.log");
            let bin = script(dir.path(), &format!("echo \"$@\" > {}", log.display()));

            CliRuntime::new(&bin)
                .run(&invocation(dir.path(), Duration::from_secs(5)))
                .await
                .unwrap();

            let logged = std::fs::read_to_string(&log).unwrap();
            assert!(logged.starts_with("run --rm -v"));
            assert!(logged.contains("haidyi/run_dbcan:latest ./input/genome.faa protein"));
        }

        #[tokio::test]
        async fn test_non_zero_exit_carries_stderr() {
            let dir = TempDir::new().unwrap();
            let bin = script(dir.path(), "echo 'pull access denied' >&2; exit 125");

            let err = CliRuntime::new(&bin)
                .run(&invocation(dir.path(), Duration::from_secs(5)))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("pull access denied"));
        }

        #[tokio::test]
        async fn test_timeout() {
            let dir = TempDir::new().unwrap();
            let bin = script(dir.path(), "sleep 5");

            let err = CliRuntime::new(&bin)
                .run(&invocation(dir.path(), Duration::from_millis(200)))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }
    }
}
