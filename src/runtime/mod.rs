//! Container runtime abstraction used to provision the broker.
//!
//! The lifecycle code only talks to [`ContainerRuntime`]. [`DockerRuntime`]
//! is the bollard-backed implementation; tests use
//! [`StubRuntime`](crate::testing::StubRuntime).

pub mod detect;
pub mod docker;
pub mod error;

pub use detect::{DockerDetection, DockerStatus, check_docker};
pub use docker::{DockerRuntime, connect_docker};
pub use error::{Result, RuntimeError};

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

/// What to run and how to know it is ready.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image reference, pulled if not present locally.
    pub image: String,
    /// Environment variables: (name, value).
    pub env: Vec<(String, String)>,
    /// Port the service listens on inside the container.
    pub exposed_port: u16,
    /// Host port to bind to. `None` lets the runtime pick one.
    pub fixed_port: Option<u16>,
    /// Log line that signals the service is ready.
    pub readiness_pattern: Regex,
    /// Upper bound on the wait for `readiness_pattern`.
    pub startup_timeout: Duration,
}

/// A started container as seen from the host.
pub struct RunningContainer {
    /// Host the mapped port is reachable on.
    pub host: String,
    /// Host port mapped to [`ContainerSpec::exposed_port`].
    pub port: u16,
    /// Capability that stops and removes the container.
    pub handle: Box<dyn ContainerHandle>,
}

impl std::fmt::Debug for RunningContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningContainer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("container", &self.handle.name())
            .finish()
    }
}

/// Terminates one container and releases its resources.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    /// Container name, for logging.
    fn name(&self) -> &str;

    /// Stop and remove the container.
    async fn release(&self) -> Result<()>;
}

/// Something that can run containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the runtime is reachable right now.
    async fn is_available(&self) -> bool;

    /// Run a container and block until it is ready or the timeout elapses.
    async fn run(&self, spec: ContainerSpec) -> Result<RunningContainer>;
}
