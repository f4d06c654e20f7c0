//! Error types for configuration, provisioning and the dev-service cycle.

use std::path::PathBuf;

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A property holds a value that cannot be used.
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Property name.
        key: String,
        /// What is wrong with the value.
        message: String,
    },

    /// A property file could not be parsed.
    #[error("Failed to parse '{}': {reason}", path.display())]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// I/O error while reading or writing configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that make a START fail.
///
/// Policy declines are not errors; they surface as
/// [`Decision::Skip`](crate::devservices::Decision::Skip).
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The configured image is not an Artemis broker image.
    #[error(
        "Unsupported image '{image}': only artemiscloud/activemq-artemis-broker images are supported"
    )]
    UnsupportedImage {
        /// Image as configured.
        image: String,
    },

    /// The container runtime failed to bring the broker up.
    #[error("Failed to start the AMQP broker: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Errors surfaced by a dev-service cycle.
#[derive(Debug, Error)]
pub enum DevServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}
