use std::sync::Arc;

use crate::config::{DevServicesConfig, LaunchMode, PropertySource};
use crate::devservices::decision::{Decision, DecisionInput, decide};
use crate::devservices::provisioner::BrokerProvisioner;
use crate::devservices::publisher::{ConfigPublisher, ResultPublisher};
use crate::devservices::registry::{ApplyOutcome, LifecycleRegistry};
use crate::error::DevServiceError;
use crate::runtime::ContainerRuntime;
use crate::shutdown::ShutdownNotifier;

/// Runs one dev-service cycle per build or reload.
#[derive(Clone)]
pub struct DevServiceController {
    runtime: Arc<dyn ContainerRuntime>,
    registry: LifecycleRegistry,
    publisher: ResultPublisher,
}

impl DevServiceController {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        sink: Arc<dyn ConfigPublisher>,
        notifiers: Vec<Arc<dyn ShutdownNotifier>>,
    ) -> Self {
        let registry = LifecycleRegistry::new(BrokerProvisioner::new(Arc::clone(&runtime)), notifiers);
        Self {
            runtime,
            registry,
            publisher: ResultPublisher::new(sink),
        }
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    /// Decide what this cycle needs without changing anything.
    pub async fn plan(
        &self,
        properties: &dyn PropertySource,
        mode: LaunchMode,
    ) -> Result<(DevServicesConfig, Decision), DevServiceError> {
        let config = DevServicesConfig::resolve(properties)?;
        let current = self.registry.current_fingerprint();
        let decision = decide(DecisionInput {
            config: &config,
            properties,
            runtime: self.runtime.as_ref(),
            current: current.as_ref(),
            full_reset: mode == LaunchMode::Test,
        })
        .await;
        Ok((config, decision))
    }

    /// Run one cycle: decide, apply, and publish on a fresh start.
    ///
    /// In [`LaunchMode::Normal`] nothing happens.
    pub async fn run_cycle(
        &self,
        properties: &dyn PropertySource,
        mode: LaunchMode,
    ) -> Result<ApplyOutcome, DevServiceError> {
        if !mode.is_dev_or_test() {
            tracing::debug!("Dev services only run in development and test mode");
            return Ok(ApplyOutcome::Inactive);
        }

        let since = self.registry.generation();
        let (config, decision) = self.plan(properties, mode).await?;
        tracing::debug!("AMQP dev service decision: {}", decision);

        let outcome = self.registry.apply_since(since, decision, &config).await?;
        if let ApplyOutcome::Started(params) = &outcome {
            self.publisher.publish(params);
        }
        Ok(outcome)
    }

    /// Stop the broker and disarm the teardown hook.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
