//! Starts and stops Artemis broker containers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::DevServicesConfig;
use crate::error::ProvisionError;
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RunningContainer};

/// AMQP port inside the broker container.
pub const AMQP_PORT: u16 = 5672;
/// The only image repository the provisioner accepts.
pub const ARTEMIS_REPOSITORY: &str = "artemiscloud/activemq-artemis-broker";
/// Logged by Artemis once its console is available.
pub const ARTEMIS_READY_PATTERN: &str = ".*AMQ241004.*";

static READY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ARTEMIS_READY_PATTERN).expect("valid readiness pattern"));

pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";

/// Connection parameters of a broker.
#[derive(Clone, Serialize)]
pub struct BrokerParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(serialize_with = "expose_password")]
    pub password: SecretString,
}

impl BrokerParams {
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for BrokerParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for BrokerParams {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.user == other.user
            && self.password() == other.password()
    }
}

// Dev credentials are fixed and printed for local tooling anyway.
fn expose_password<S: serde::Serializer>(
    password: &SecretString,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(password.expose_secret())
}

/// Release capability that runs its container release at most once.
pub struct ReleaseHandle {
    container: Box<dyn ContainerHandle>,
    released: AtomicBool,
}

impl ReleaseHandle {
    pub fn new(container: Box<dyn ContainerHandle>) -> Self {
        Self {
            container,
            released: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.container.name()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the container. Later calls are no-ops returning `Ok`.
    pub async fn release(&self) -> crate::runtime::Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.container.release().await
    }
}

/// One running dev broker.
pub struct BrokerInstance {
    params: BrokerParams,
    release: Arc<ReleaseHandle>,
}

impl BrokerInstance {
    pub fn from_container(container: RunningContainer) -> Self {
        Self {
            params: BrokerParams {
                host: container.host,
                port: container.port,
                user: DEFAULT_USER.to_string(),
                password: SecretString::from(DEFAULT_PASSWORD.to_string()),
            },
            release: Arc::new(ReleaseHandle::new(container.handle)),
        }
    }

    pub fn params(&self) -> &BrokerParams {
        &self.params
    }

    pub fn release_handle(&self) -> Arc<ReleaseHandle> {
        Arc::clone(&self.release)
    }
}

impl std::fmt::Debug for BrokerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerInstance")
            .field("params", &self.params)
            .field("container", &self.release.name())
            .field("released", &self.release.is_released())
            .finish()
    }
}

/// Repository part of an image reference, without registry, tag or digest.
///
/// `quay.io/artemiscloud/activemq-artemis-broker:1.0.25` ->
/// `artemiscloud/activemq-artemis-broker`.
pub fn image_repository(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);

    // A colon after the last slash separates the tag.
    let without_tag = match without_digest.rfind(':') {
        Some(idx) if !without_digest[idx..].contains('/') => &without_digest[..idx],
        _ => without_digest,
    };

    match without_tag.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            rest
        }
        _ => without_tag,
    }
}

/// Brings Artemis brokers up through a [`ContainerRuntime`].
#[derive(Clone)]
pub struct BrokerProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl BrokerProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Start a broker for `config`.
    ///
    /// Returns `Ok(None)` when the config does not allow a broker. The image
    /// is validated before anything is launched.
    pub async fn start(
        &self,
        config: &DevServicesConfig,
    ) -> Result<Option<BrokerInstance>, ProvisionError> {
        if !config.enabled {
            tracing::debug!("AMQP dev services disabled, not starting a broker");
            return Ok(None);
        }

        if image_repository(&config.image_name) != ARTEMIS_REPOSITORY {
            return Err(ProvisionError::UnsupportedImage {
                image: config.image_name.clone(),
            });
        }

        let spec = broker_spec(config);
        tracing::info!("Starting AMQP broker from {}", spec.image);

        let container = self.runtime.run(spec).await?;
        Ok(Some(BrokerInstance::from_container(container)))
    }

    /// Stop a broker. Failures are logged, never returned.
    pub async fn stop(&self, instance: BrokerInstance) {
        let handle = instance.release_handle();
        if let Err(e) = handle.release().await {
            tracing::error!("Failed to stop the AMQP broker: {}", e);
        } else {
            tracing::info!("Stopped AMQP broker container '{}'", handle.name());
        }
    }
}

fn broker_spec(config: &DevServicesConfig) -> ContainerSpec {
    ContainerSpec {
        image: config.image_name.clone(),
        env: vec![
            ("AMQ_USER".to_string(), DEFAULT_USER.to_string()),
            ("AMQ_PASSWORD".to_string(), DEFAULT_PASSWORD.to_string()),
            ("AMQ_EXTRA_ARGS".to_string(), config.extra_args.clone()),
        ],
        exposed_port: AMQP_PORT,
        fixed_port: config.fixed_port,
        readiness_pattern: READY_REGEX.clone(),
        startup_timeout: config.startup_timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubRuntime;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_image_repository_strips_registry_and_tag() {
        assert_eq!(
            image_repository("quay.io/artemiscloud/activemq-artemis-broker:1.0.25"),
            ARTEMIS_REPOSITORY
        );
        assert_eq!(
            image_repository("artemiscloud/activemq-artemis-broker"),
            ARTEMIS_REPOSITORY
        );
        assert_eq!(
            image_repository("localhost:5000/artemiscloud/activemq-artemis-broker:dev"),
            ARTEMIS_REPOSITORY
        );
        assert_eq!(
            image_repository("artemiscloud/activemq-artemis-broker@sha256:abc"),
            ARTEMIS_REPOSITORY
        );
        assert_eq!(image_repository("rabbitmq:3-management"), "rabbitmq");
    }

    #[test]
    fn test_broker_spec_carries_config() {
        let config = DevServicesConfig {
            fixed_port: Some(5673),
            extra_args: "--relax-jolokia".to_string(),
            ..Default::default()
        };
        let spec = broker_spec(&config);

        assert_eq!(spec.exposed_port, AMQP_PORT);
        assert_eq!(spec.fixed_port, Some(5673));
        assert_eq!(spec.startup_timeout, config.startup_timeout);
        assert!(spec.readiness_pattern.is_match("INFO AMQ241004: Artemis Console available"));
        assert!(
            spec.env
                .contains(&("AMQ_EXTRA_ARGS".to_string(), "--relax-jolokia".to_string()))
        );
        assert!(spec.env.iter().any(|(k, v)| k == "AMQ_USER" && v == "admin"));
    }

    #[tokio::test]
    async fn test_unsupported_image_fails_before_launch() {
        let runtime = Arc::new(StubRuntime::new());
        let provisioner = BrokerProvisioner::new(runtime.clone());
        let config = DevServicesConfig {
            image_name: "rabbitmq:3".to_string(),
            ..Default::default()
        };

        let err = provisioner.start(&config).await.unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedImage { .. }));
        assert_eq!(runtime.runs(), 0);
    }

    #[tokio::test]
    async fn test_disabled_config_declines() {
        let runtime = Arc::new(StubRuntime::new());
        let provisioner = BrokerProvisioner::new(runtime.clone());
        let config = DevServicesConfig {
            enabled: false,
            ..Default::default()
        };

        assert!(provisioner.start(&config).await.unwrap().is_none());
        assert_eq!(runtime.runs(), 0);
    }

    #[tokio::test]
    async fn test_start_produces_fixed_credentials() {
        let runtime = Arc::new(StubRuntime::new());
        let provisioner = BrokerProvisioner::new(runtime.clone());

        let instance = provisioner
            .start(&DevServicesConfig::default())
            .await
            .unwrap()
            .unwrap();

        let params = instance.params();
        assert_eq!(params.host, "localhost");
        assert_eq!(params.user, DEFAULT_USER);
        assert_eq!(params.password(), DEFAULT_PASSWORD);
        assert!(format!("{instance:?}").contains("[REDACTED]"));
        assert_eq!(runtime.last_spec().unwrap().image, DevServicesConfig::default().image_name);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_provision_error() {
        let runtime = Arc::new(StubRuntime::failing());
        let provisioner = BrokerProvisioner::new(runtime.clone());

        let err = provisioner
            .start(&DevServicesConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_release_handle_runs_once() {
        let runtime = Arc::new(StubRuntime::new());
        let provisioner = BrokerProvisioner::new(runtime.clone());
        let instance = provisioner
            .start(&DevServicesConfig::default())
            .await
            .unwrap()
            .unwrap();

        let handle = instance.release_handle();
        handle.release().await.unwrap();
        handle.release().await.unwrap();
        provisioner.stop(instance).await;

        assert!(handle.is_released());
        assert_eq!(runtime.releases(), 1);
    }

    #[tokio::test]
    async fn test_stop_swallows_release_failure() {
        let runtime = Arc::new(StubRuntime::new().with_failing_release());
        let provisioner = BrokerProvisioner::new(runtime.clone());
        let instance = provisioner
            .start(&DevServicesConfig::default())
            .await
            .unwrap()
            .unwrap();

        provisioner.stop(instance).await;
        assert_eq!(runtime.releases(), 1);
    }

    #[test]
    fn test_params_serialize_with_password() {
        let params = BrokerParams {
            host: "localhost".to_string(),
            port: 32768,
            user: "admin".to_string(),
            password: SecretString::from("admin".to_string()),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["port"], 32768);
        assert_eq!(json["password"], "admin");
        assert!(format!("{params:?}").contains("[REDACTED]"));
    }
}
