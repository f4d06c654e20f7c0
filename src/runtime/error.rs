//! Error types for the container runtime.

use thiserror::Error;

/// Result type for container runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while running or releasing a container.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image name.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Readiness log line not seen within the timeout.
    #[error("Container '{name}' not ready within {timeout:?}")]
    ReadinessTimeout {
        /// Container name.
        name: String,
        /// Timeout duration.
        timeout: std::time::Duration,
    },

    /// Container exited before becoming ready.
    #[error("Container '{name}' stopped unexpectedly: {reason}")]
    ContainerStopped {
        /// Container name.
        name: String,
        /// What was observed.
        reason: String,
    },

    /// The exposed port has no host mapping.
    #[error("Container '{name}' has no host mapping for port {port}")]
    PortNotMapped {
        /// Container name.
        name: String,
        /// Container port.
        port: u16,
    },

    /// Failed to stop or remove the container.
    #[error("Failed to release container '{name}': {reason}")]
    ReleaseFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },
}
