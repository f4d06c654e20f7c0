//! Docker-backed container runtime.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use futures::StreamExt;
use regex::Regex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::runtime::error::{Result, RuntimeError};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RunningContainer};

const CONTAINER_PREFIX: &str = "amqp-devservice";

/// Connect to the local Docker daemon and make sure it answers.
///
/// Tries bollard's defaults first (`DOCKER_HOST` or the platform socket),
/// then the Docker Desktop socket under the home directory and the rootless
/// socket under `$XDG_RUNTIME_DIR`.
pub async fn connect_docker() -> Result<Docker> {
    let mut last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    #[cfg(unix)]
    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }
        let path = socket.to_string_lossy();
        match Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    tracing::debug!("Connected to Docker via {}", path);
                    return Ok(docker);
                }
                Err(e) => last_error = e.to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(RuntimeError::DockerNotAvailable { reason: last_error })
}

#[cfg(unix)]
fn fallback_sockets() -> Vec<std::path::PathBuf> {
    let mut sockets = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock"));
    }
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        sockets.push(std::path::PathBuf::from(runtime_dir).join("docker.sock"));
    }
    sockets
}

/// Host that published container ports are reachable on.
///
/// A `tcp://` `DOCKER_HOST` points at a remote daemon, so its host is used;
/// anything else means the daemon is local.
pub fn advertised_host(docker_host: Option<&str>) -> String {
    docker_host
        .and_then(|h| h.strip_prefix("tcp://"))
        .and_then(|rest| rest.split([':', '/']).next())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

/// Runs containers through the Docker daemon.
///
/// The connection is established lazily, so a runtime can be built while
/// Docker is down and report itself unavailable.
pub struct DockerRuntime {
    docker: RwLock<Option<Docker>>,
    host: String,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            docker: RwLock::new(None),
            host: advertised_host(std::env::var("DOCKER_HOST").ok().as_deref()),
        }
    }

    async fn client(&self) -> Result<Docker> {
        if let Some(docker) = self.docker.read().await.clone() {
            return Ok(docker);
        }
        let docker = connect_docker().await?;
        *self.docker.write().await = Some(docker.clone());
        Ok(docker)
    }

    async fn pull_image(&self, docker: &Docker, image: &str) -> Result<()> {
        if docker.inspect_image(image).await.is_ok() {
            tracing::debug!("Image '{}' exists locally", image);
            return Ok(());
        }

        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pulled image: {}", image);
        Ok(())
    }

    async fn create_container(
        &self,
        docker: &Docker,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String> {
        let port_key = format!("{}/tcp", spec.exposed_port);

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                // No host port lets Docker choose a free one.
                host_port: spec.fixed_port.map(|p| p.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };

        let response = docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::ContainerCreationFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(response.id)
    }

    /// Start a created container, wait for readiness and look up its port.
    async fn bring_up(&self, docker: &Docker, name: &str, spec: &ContainerSpec) -> Result<u16> {
        docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::ContainerStartFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Waiting up to {:?} for '{}' to be ready", spec.startup_timeout, name);

        match tokio::time::timeout(
            spec.startup_timeout,
            wait_for_log(docker, name, &spec.readiness_pattern),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(RuntimeError::ReadinessTimeout {
                    name: name.to_string(),
                    timeout: spec.startup_timeout,
                });
            }
        }

        mapped_port(docker, name, spec.exposed_port).await
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn is_available(&self) -> bool {
        match self.client().await {
            Ok(docker) => docker.ping().await.is_ok(),
            Err(e) => {
                tracing::debug!("Docker check failed: {}", e);
                false
            }
        }
    }

    async fn run(&self, spec: ContainerSpec) -> Result<RunningContainer> {
        let docker = self.client().await?;
        let name = format!("{}-{}", CONTAINER_PREFIX, &Uuid::new_v4().simple().to_string()[..8]);

        self.pull_image(&docker, &spec.image).await?;
        let id = self.create_container(&docker, &name, &spec).await?;

        let handle = DockerContainer {
            docker: docker.clone(),
            id,
            name: name.clone(),
        };

        match self.bring_up(&docker, &name, &spec).await {
            Ok(port) => {
                tracing::info!("Started container '{}' from {}", name, spec.image);
                Ok(RunningContainer {
                    host: self.host.clone(),
                    port,
                    handle: Box::new(handle),
                })
            }
            Err(e) => {
                // Never leave a half-started container behind.
                if let Err(cleanup) = handle.release().await {
                    tracing::warn!("Cleanup after failed start also failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }
}

/// A container created by [`DockerRuntime`].
struct DockerContainer {
    docker: Docker,
    id: String,
    name: String,
}

#[async_trait]
impl ContainerHandle for DockerContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&self) -> Result<()> {
        let result = self
            .docker
            .remove_container(
                &self.id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await;

        match result {
            Ok(()) => {
                tracing::debug!("Removed container '{}'", self.name);
                Ok(())
            }
            // Already gone.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(RuntimeError::ReleaseFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

async fn wait_for_log(docker: &Docker, name: &str, pattern: &Regex) -> Result<()> {
    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        ..Default::default()
    };
    let mut stream = docker.logs(name, Some(options));
    let mut pending = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| RuntimeError::ContainerStopped {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        pending.push_str(&chunk.to_string());
        if scan_lines(&mut pending, pattern) {
            return Ok(());
        }
    }

    Err(RuntimeError::ContainerStopped {
        name: name.to_string(),
        reason: "log stream ended before the readiness line".to_string(),
    })
}

/// Check buffered log output against `pattern` line by line.
///
/// Complete lines are consumed; a trailing partial line stays in `pending`
/// so a match split across chunks is still found.
fn scan_lines(pending: &mut String, pattern: &Regex) -> bool {
    if pending.lines().any(|line| pattern.is_match(line)) {
        pending.clear();
        return true;
    }
    if let Some(idx) = pending.rfind('\n') {
        pending.drain(..=idx);
    }
    false
}

async fn mapped_port(docker: &Docker, name: &str, exposed_port: u16) -> Result<u16> {
    let info = docker
        .inspect_container(name, None::<InspectContainerOptions>)
        .await
        .map_err(|e| RuntimeError::ContainerStopped {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    let key = format!("{exposed_port}/tcp");
    info.network_settings
        .and_then(|settings| settings.ports)
        .and_then(|mut ports| ports.remove(&key))
        .flatten()
        .and_then(|bindings| {
            bindings
                .into_iter()
                .find_map(|b| b.host_port.and_then(|p| p.parse().ok()))
        })
        .ok_or_else(|| RuntimeError::PortNotMapped {
            name: name.to_string(),
            port: exposed_port,
        })
}
