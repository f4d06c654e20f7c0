//! Explains why the broker cannot be provisioned locally.
//!
//! A "runtime unavailable" skip is either a missing `docker` binary or a
//! daemon that does not answer. Either way the application can still be
//! pointed at an existing broker through `amqp-host`/`amqp-port`.

use std::ffi::OsStr;
use std::path::Path;

use crate::devservices::{AMQP_HOST_PROP, AMQP_PORT_PROP};

/// Docker daemon availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    /// Binary on PATH and daemon answering pings.
    Available,
    /// `docker` binary not found on PATH.
    NotInstalled,
    /// Binary found but daemon not responding.
    NotRunning,
}

impl DockerStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, DockerStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DockerStatus::Available => "available",
            DockerStatus::NotInstalled => "not installed",
            DockerStatus::NotRunning => "not running",
        }
    }
}

/// Outcome of [`check_docker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockerDetection {
    pub status: DockerStatus,
    /// `std::env::consts::OS` of the host the check ran on.
    pub os: &'static str,
}

impl DockerDetection {
    /// What to do so the next cycle can provision a broker, if anything.
    pub fn hint(&self) -> Option<String> {
        let fallback = format!("or set {AMQP_HOST_PROP}/{AMQP_PORT_PROP} to use an existing broker");
        match self.status {
            DockerStatus::Available => None,
            DockerStatus::NotInstalled => Some(format!(
                "No docker binary on PATH. Install Docker ({}) {}.",
                install_url(self.os),
                fallback
            )),
            DockerStatus::NotRunning => Some(format!(
                "The Docker daemon is not answering. {} {}.",
                start_action(self.os),
                fallback
            )),
        }
    }
}

fn install_url(os: &str) -> &'static str {
    match os {
        "macos" | "windows" => "https://docs.docker.com/desktop/",
        _ => "https://docs.docker.com/engine/install/",
    }
}

fn start_action(os: &str) -> &'static str {
    match os {
        "macos" => "Launch Docker Desktop (open -a Docker)",
        "windows" => "Launch Docker Desktop",
        _ => "Start it with `systemctl start docker` (`systemctl --user start docker` when rootless)",
    }
}

/// Check whether Docker is installed and its daemon reachable.
pub async fn check_docker() -> DockerDetection {
    let binary_found = std::env::var_os("PATH").is_some_and(|paths| on_path(&paths, docker_binary()));

    let status = if !binary_found {
        DockerStatus::NotInstalled
    } else if crate::runtime::connect_docker().await.is_ok() {
        DockerStatus::Available
    } else {
        DockerStatus::NotRunning
    };

    DockerDetection {
        status,
        os: std::env::consts::OS,
    }
}

fn docker_binary() -> &'static str {
    if cfg!(windows) { "docker.exe" } else { "docker" }
}

fn on_path(paths: &OsStr, binary: &str) -> bool {
    std::env::split_paths(paths).any(|dir| is_file(&dir.join(binary)))
}

fn is_file(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_file())
}
