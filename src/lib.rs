//! AMQP dev services.
//!
//! Provisions a throwaway AMQP broker container for applications running in
//! development or test mode, keeps it alive across reload cycles while the
//! relevant configuration is unchanged, and tears it down when the process or
//! the application context shuts down.

pub mod cli;
pub mod config;
pub mod devservices;
pub mod error;
pub mod runtime;
pub mod shutdown;
pub mod testing;

pub use config::{DevServicesConfig, LaunchMode, PropertySource};
pub use devservices::{ApplyOutcome, BrokerParams, DevServiceController};
pub use error::{ConfigError, DevServiceError, ProvisionError};
