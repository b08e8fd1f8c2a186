use super::container::NodeContainerSpec;
use super::image::{parse_manifest_digests, parse_repo_digests, ImageReference};
use crate::process::{to_args, CommandError, ProcessRunner};
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;

const DOCKER_BINARY: &str = "docker";
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub(crate) enum EngineError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("Unexpected output from `docker {command}`: {message}")]
    Parse { command: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResourceLimits {
    pub(crate) cpu_count: u32,
    pub(crate) memory_gb: u32,
}

#[derive(Debug, Deserialize)]
struct EngineInfo {
    #[serde(rename = "NCPU")]
    cpu_count: u32,
    #[serde(rename = "MemTotal")]
    memory_bytes: u64,
}

/// Thin adapter over the docker CLI. Every non-zero exit surfaces as
/// [`EngineError::Command`] carrying the arguments and exit code.
#[derive(Clone)]
pub(crate) struct DockerEngine {
    runner: Arc<dyn ProcessRunner>,
}

impl DockerEngine {
    pub(crate) fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn docker(&self, args: &[&str]) -> Result<String, EngineError> {
        let output = self.runner.run(DOCKER_BINARY, &to_args(args)).await?;
        Ok(output.stdout)
    }

    fn lines(stdout: &str) -> impl Iterator<Item = &str> {
        stdout.lines().map(str::trim).filter(|line| !line.is_empty())
    }

    /// Absolute path of the docker binary, used when rendering scripts that
    /// run outside of an interactive shell.
    pub(crate) async fn binary_path(&self) -> Result<String, EngineError> {
        let output = self.runner.run("which", &to_args(&[DOCKER_BINARY])).await?;
        let path = output.stdout.trim();
        if path.is_empty() {
            return Err(EngineError::Parse {
                command: "which docker".to_string(),
                message: "empty path".to_string(),
            });
        }
        Ok(path.to_string())
    }

    /// Whether NVIDIA devices can be handed to the container.
    pub(crate) async fn gpu_available(&self) -> bool {
        match self.runner.run("nvidia-smi", &[]).await {
            Ok(_) => true,
            Err(e) => {
                debug!("No usable GPU found: {e}");
                false
            }
        }
    }

    pub(crate) async fn network_exists(&self, name: &str) -> Result<bool, EngineError> {
        let stdout = self.docker(&["network", "ls", "--format", "{{.Name}}"]).await?;
        let found = Self::lines(&stdout).any(|network| network == name);
        Ok(found)
    }

    /// Creates a fresh bridge network, replacing a stale one left behind by a
    /// previous run.
    pub(crate) async fn create_network(&self, name: &str) -> Result<(), EngineError> {
        if self.network_exists(name).await? {
            debug!("Removing existing network {name}");
            self.remove_network(name).await?;
        }
        self.docker(&["network", "create", "--driver", "bridge", name])
            .await?;
        Ok(())
    }

    pub(crate) async fn remove_network(&self, name: &str) -> Result<(), EngineError> {
        self.docker(&["network", "rm", name]).await?;
        Ok(())
    }

    pub(crate) async fn container_exists(&self, name: &str) -> Result<bool, EngineError> {
        let stdout = self.docker(&["ps", "-a", "--format", "{{.Names}}"]).await?;
        let found = Self::lines(&stdout).any(|container| container == name);
        Ok(found)
    }

    pub(crate) async fn container_running(&self, name: &str) -> Result<bool, EngineError> {
        let stdout = self.docker(&["ps", "--format", "{{.Names}}"]).await?;
        let found = Self::lines(&stdout).any(|container| container == name);
        Ok(found)
    }

    pub(crate) async fn image_pull(&self, image: &ImageReference) -> Result<(), EngineError> {
        let reference = image.to_string();
        info!("Pulling image {reference}");
        self.docker(&["image", "pull", &reference]).await?;
        Ok(())
    }

    /// Digests recorded for the local image. Fails when the image is absent.
    pub(crate) async fn image_inspect(
        &self,
        image: &ImageReference,
    ) -> Result<Vec<String>, EngineError> {
        let reference = image.to_string();
        let stdout = self.docker(&["image", "inspect", &reference]).await?;
        parse_repo_digests(&stdout).map_err(|e| EngineError::Parse {
            command: "image inspect".to_string(),
            message: e.to_string(),
        })
    }

    /// Descriptor digests published by the registry for the reference.
    pub(crate) async fn manifest_inspect(
        &self,
        image: &ImageReference,
    ) -> Result<Vec<String>, EngineError> {
        let reference = image.to_string();
        let stdout = self
            .docker(&["manifest", "inspect", "--verbose", &reference])
            .await?;
        parse_manifest_digests(&stdout).map_err(|e| EngineError::Parse {
            command: "manifest inspect".to_string(),
            message: e.to_string(),
        })
    }

    pub(crate) async fn start(&self, spec: &NodeContainerSpec) -> Result<(), EngineError> {
        let args = spec.run_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&args).await?;
        Ok(())
    }

    pub(crate) async fn stop_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker(&["stop", name]).await?;
        Ok(())
    }

    pub(crate) async fn remove_container(&self, name: &str) -> Result<(), EngineError> {
        self.docker(&["rm", name]).await?;
        Ok(())
    }

    /// Removes every local tag of `repository` except `keep_tag`. Every
    /// removal is attempted; the first failure is returned afterwards.
    pub(crate) async fn remove_dangling_images(
        &self,
        repository: &str,
        keep_tag: &str,
    ) -> Result<usize, EngineError> {
        let stdout = self
            .docker(&["image", "ls", repository, "--format", "{{.Tag}}\t{{.ID}}"])
            .await?;

        let mut removed = 0;
        let mut first_error = None;
        for line in Self::lines(&stdout) {
            let (tag, id) = line.split_once('\t').unwrap_or((line, line));
            if tag == keep_tag {
                continue;
            }
            let target = if tag == "<none>" {
                id.to_string()
            } else {
                format!("{repository}:{tag}")
            };

            match self.docker(&["image", "rm", &target]).await {
                Ok(_) => removed += 1,
                Err(e) => {
                    warn!("Failed to remove image {target}");
                    debug!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    pub(crate) async fn resource_limits(&self) -> Result<ResourceLimits, EngineError> {
        let stdout = self.docker(&["info", "--format", "{{json .}}"]).await?;
        let info: EngineInfo =
            serde_json::from_str(stdout.trim()).map_err(|e| EngineError::Parse {
                command: "info".to_string(),
                message: e.to_string(),
            })?;

        Ok(ResourceLimits {
            cpu_count: info.cpu_count,
            memory_gb: (info.memory_bytes / BYTES_PER_GB) as u32,
        })
    }
}
