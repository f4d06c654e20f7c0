use std::time::Duration;

use crate::config::PropertySource;
use crate::devservices::ConfigFingerprint;
use crate::error::ConfigError;

pub const ENABLED_PROP: &str = "amqp.devservices.enabled";
pub const IMAGE_NAME_PROP: &str = "amqp.devservices.image-name";
pub const PORT_PROP: &str = "amqp.devservices.port";
pub const EXTRA_ARGS_PROP: &str = "amqp.devservices.extra-args";
pub const STARTUP_TIMEOUT_PROP: &str = "amqp.devservices.startup-timeout";

pub const DEFAULT_IMAGE_NAME: &str = "quay.io/artemiscloud/activemq-artemis-broker:1.0.25";
pub const DEFAULT_EXTRA_ARGS: &str = "--no-autotune --mapped --no-fsync";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

/// How the application is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Production run. Dev services never start.
    Normal,
    /// Live development loop.
    #[default]
    Development,
    /// Test run. Every cycle starts from a fresh broker.
    Test,
}

impl LaunchMode {
    /// Whether dev services apply to this mode at all.
    pub fn is_dev_or_test(&self) -> bool {
        matches!(self, Self::Development | Self::Test)
    }
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" | "prod" | "production" => Ok(Self::Normal),
            "dev" | "development" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            _ => Err(format!(
                "invalid launch mode '{}', expected 'normal', 'development' or 'test'",
                s
            )),
        }
    }
}

/// Build-time settings of the AMQP dev service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServicesConfig {
    /// Whether the dev service may start a broker (default: true).
    pub enabled: bool,
    /// Broker image. Only Artemis images are accepted.
    pub image_name: String,
    /// Host port to pin the broker to. `None` picks a random port.
    pub fixed_port: Option<u16>,
    /// Passed to the broker as `AMQ_EXTRA_ARGS`.
    pub extra_args: String,
    /// How long to wait for the broker's readiness log line.
    pub startup_timeout: Duration,
}

impl Default for DevServicesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_name: DEFAULT_IMAGE_NAME.to_string(),
            fixed_port: None,
            extra_args: DEFAULT_EXTRA_ARGS.to_string(),
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
        }
    }
}

impl DevServicesConfig {
    pub fn resolve(properties: &dyn PropertySource) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let enabled = match properties.value(ENABLED_PROP) {
            Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: ENABLED_PROP.to_string(),
                message: format!("must be 'true' or 'false': {e}"),
            })?,
            None => defaults.enabled,
        };

        let image_name = properties
            .value(IMAGE_NAME_PROP)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.image_name);

        // Port 0 means "not pinned".
        let fixed_port = match properties.value(PORT_PROP) {
            Some(v) => {
                let port: u16 = v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: PORT_PROP.to_string(),
                    message: format!("must be a port number: {e}"),
                })?;
                (port != 0).then_some(port)
            }
            None => None,
        };

        let extra_args = properties
            .value(EXTRA_ARGS_PROP)
            .unwrap_or(defaults.extra_args);

        let startup_timeout = match properties.value(STARTUP_TIMEOUT_PROP) {
            Some(v) => {
                let secs: u64 = v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: STARTUP_TIMEOUT_PROP.to_string(),
                    message: format!("must be a number of seconds: {e}"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: STARTUP_TIMEOUT_PROP.to_string(),
                        message: "must be greater than zero".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.startup_timeout,
        };

        Ok(Self {
            enabled,
            image_name,
            fixed_port,
            extra_args,
            startup_timeout,
        })
    }

    /// Comparison key deciding between reuse and restart.
    pub fn fingerprint(&self) -> ConfigFingerprint {
        ConfigFingerprint::new(
            self.enabled,
            self.image_name.clone(),
            self.fixed_port,
            self.extra_args.clone(),
        )
    }
}
