//! Publishes broker connection parameters to the application's config sinks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::devservices::decision::{AMQP_HOST_PROP, AMQP_PORT_PROP};
use crate::devservices::provisioner::BrokerParams;
use crate::error::ConfigError;

pub const AMQP_USER_PROP: &str = "amqp-user";
pub const AMQP_PASSWORD_PROP: &str = "amqp-password";

/// Destination for published connection parameters.
///
/// Publishing a key again overwrites the previous value.
pub trait ConfigPublisher: Send + Sync {
    /// Default for the application's runtime configuration.
    fn publish_default(&self, key: &str, value: &str);

    /// Informational property for tooling and build output.
    fn publish_diagnostic(&self, key: &str, value: &str);
}

/// Keeps published properties in memory.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    defaults: RwLock<BTreeMap<String, String>>,
    diagnostics: RwLock<BTreeMap<String, String>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults(&self) -> BTreeMap<String, String> {
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn diagnostics(&self) -> BTreeMap<String, String> {
        self.diagnostics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConfigPublisher for InMemoryPublisher {
    fn publish_default(&self, key: &str, value: &str) {
        self.defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn publish_diagnostic(&self, key: &str, value: &str) {
        self.diagnostics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

/// Writes diagnostic properties to a `.env` file other processes can load.
///
/// Defaults are kept in memory. Property names are upper-cased and dashes
/// become underscores (`amqp-host` -> `AMQP_HOST`).
#[derive(Debug)]
pub struct EnvFilePublisher {
    path: PathBuf,
    memory: InMemoryPublisher,
}

impl EnvFilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memory: InMemoryPublisher::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> BTreeMap<String, String> {
        self.memory.defaults()
    }

    fn write_file(&self) -> Result<(), ConfigError> {
        let mut content = String::from("# Written by amqp-devservices\n");
        for (key, value) in self.memory.diagnostics() {
            content.push_str(&format!("{}=\"{}\"\n", env_key(&key), escape_value(&value)));
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ConfigPublisher for EnvFilePublisher {
    fn publish_default(&self, key: &str, value: &str) {
        self.memory.publish_default(key, value);
    }

    fn publish_diagnostic(&self, key: &str, value: &str) {
        self.memory.publish_diagnostic(key, value);
        if let Err(e) = self.write_file() {
            tracing::error!(
                "Failed to write dev service properties to {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Pushes [`BrokerParams`] into both sinks of a [`ConfigPublisher`].
#[derive(Clone)]
pub struct ResultPublisher {
    sink: Arc<dyn ConfigPublisher>,
}

impl ResultPublisher {
    pub fn new(sink: Arc<dyn ConfigPublisher>) -> Self {
        Self { sink }
    }

    pub fn publish(&self, params: &BrokerParams) {
        let port = params.port.to_string();
        let entries = [
            (AMQP_HOST_PROP, params.host.as_str()),
            (AMQP_PORT_PROP, port.as_str()),
            (AMQP_USER_PROP, params.user.as_str()),
            (AMQP_PASSWORD_PROP, params.password()),
        ];

        for (key, value) in entries {
            self.sink.publish_default(key, value);
        }
        for (key, value) in entries {
            self.sink.publish_diagnostic(key, value);
        }

        tracing::info!(
            "Dev Services for AMQP started. Start applications that need to use the same AMQP broker \
             using -Damqp.host={} -Damqp.port={} -Damqp.user={} -Damqp.password={}",
            params.host,
            params.port,
            params.user,
            params.password()
        );
    }
}
