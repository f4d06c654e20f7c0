//! Owner of the running dev broker and its teardown hook.
//!
//! The registry keeps at most one broker. All state lives behind a single
//! mutex that is only held to read or swap state; starting and stopping
//! containers happens outside of it. Teardown is armed on every configured
//! [`ShutdownNotifier`] after the first successful start. Whichever notifier
//! fires first stops the broker and cancels the others.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;

use crate::config::DevServicesConfig;
use crate::devservices::decision::Decision;
use crate::devservices::fingerprint::ConfigFingerprint;
use crate::devservices::provisioner::{BrokerInstance, BrokerParams, BrokerProvisioner};
use crate::error::ProvisionError;
use crate::shutdown::{ShutdownCallback, ShutdownNotifier, ShutdownToken};

/// Result of applying a [`Decision`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// A new broker was started. Its parameters must be published.
    Started(BrokerParams),
    /// The running broker was kept. Its parameters are already published.
    Reused(BrokerParams),
    /// No broker is running.
    Inactive,
}

impl ApplyOutcome {
    pub fn params(&self) -> Option<&BrokerParams> {
        match self {
            Self::Started(params) | Self::Reused(params) => Some(params),
            Self::Inactive => None,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

struct ActiveBroker {
    instance: BrokerInstance,
    fingerprint: ConfigFingerprint,
}

struct HookRegistration {
    tokens: Vec<(Arc<dyn ShutdownNotifier>, ShutdownToken)>,
}

impl HookRegistration {
    fn cancel_all(self) {
        for (notifier, token) in self.tokens {
            notifier.cancel(token);
        }
    }
}

#[derive(Default)]
struct RegistryState {
    // Instance and fingerprint travel together.
    active: Option<ActiveBroker>,
    // Some while the teardown task is registered.
    hook: Option<HookRegistration>,
    // Bumped by every teardown. A start that began under an older value
    // must not commit.
    generation: u64,
}

struct RegistryInner {
    provisioner: BrokerProvisioner,
    notifiers: Vec<Arc<dyn ShutdownNotifier>>,
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn teardown(&self) {
        let (active, hook) = {
            let mut state = self.lock();
            state.generation += 1;
            (state.active.take(), state.hook.take())
        };

        if let Some(hook) = hook {
            hook.cancel_all();
        }
        if let Some(active) = active {
            tracing::info!("Shutting down the AMQP dev service broker");
            self.provisioner.stop(active.instance).await;
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = &state.active {
            tracing::warn!(
                "Lifecycle registry dropped without shutdown(), container '{}' may remain running",
                active.instance.release_handle().name()
            );
        }
    }
}

/// Number of teardowns a registry has gone through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

enum Commit {
    // Slot taken; holds whatever was in it before.
    Registered(Option<ActiveBroker>),
    // A teardown ran while provisioning.
    TornDown(BrokerInstance),
}

/// Stops the registered broker when a termination path fires.
struct TeardownTask {
    registry: Weak<RegistryInner>,
}

#[async_trait]
impl ShutdownCallback for TeardownTask {
    fn name(&self) -> &str {
        "amqp-devservice-teardown"
    }

    async fn run(&self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.teardown().await;
        }
    }
}

/// Lifecycle registry of the AMQP dev broker.
///
/// Cloning gives another handle to the same registry.
#[derive(Clone)]
pub struct LifecycleRegistry {
    inner: Arc<RegistryInner>,
}

impl LifecycleRegistry {
    /// Create a registry whose teardown hook is armed on `notifiers`.
    pub fn new(provisioner: BrokerProvisioner, notifiers: Vec<Arc<dyn ShutdownNotifier>>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                provisioner,
                notifiers,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn provisioner(&self) -> &BrokerProvisioner {
        &self.inner.provisioner
    }

    /// Fingerprint of the running broker.
    pub fn current_fingerprint(&self) -> Option<ConfigFingerprint> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.fingerprint.clone())
    }

    /// Parameters of the running broker.
    pub fn current_params(&self) -> Option<BrokerParams> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.instance.params().clone())
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    /// Whether the teardown task is currently registered.
    pub fn hook_installed(&self) -> bool {
        self.inner.lock().hook.is_some()
    }

    /// Current teardown generation. Pass it to [`apply_since`](Self::apply_since)
    /// to tie a decision to the state it was taken in.
    pub fn generation(&self) -> Generation {
        Generation(self.inner.lock().generation)
    }

    /// Carry out `decision` for `config`.
    ///
    /// Only a failed start returns an error; the slot is empty afterwards.
    pub async fn apply(
        &self,
        decision: Decision,
        config: &DevServicesConfig,
    ) -> Result<ApplyOutcome, ProvisionError> {
        let since = self.generation();
        self.apply_since(since, decision, config).await
    }

    /// Like [`apply`](Self::apply), but a start is abandoned, and a broker it
    /// brought up is stopped again, if a teardown ran after `since`.
    pub async fn apply_since(
        &self,
        since: Generation,
        decision: Decision,
        config: &DevServicesConfig,
    ) -> Result<ApplyOutcome, ProvisionError> {
        match decision {
            Decision::Skip(reason) => {
                if self.stop().await {
                    tracing::info!("AMQP dev service no longer needed ({}), broker stopped", reason);
                }
                Ok(ApplyOutcome::Inactive)
            }
            Decision::Reuse => match self.current_params() {
                Some(params) => Ok(ApplyOutcome::Reused(params)),
                None => {
                    // Torn down between the decision and now.
                    tracing::debug!("No AMQP broker left to reuse");
                    Ok(ApplyOutcome::Inactive)
                }
            },
            Decision::Restart => {
                self.stop().await;
                self.start(since, config).await
            }
            Decision::Start => self.start(since, config).await,
        }
    }

    /// Stop the running broker, keeping the teardown hook armed.
    ///
    /// Returns whether a broker was running.
    pub async fn stop(&self) -> bool {
        let active = self.inner.lock().active.take();
        match active {
            Some(active) => {
                self.inner.provisioner.stop(active.instance).await;
                true
            }
            None => false,
        }
    }

    /// Final teardown: stop the broker and remove the hook everywhere.
    ///
    /// A later start arms the hook again.
    pub async fn shutdown(&self) {
        self.inner.teardown().await;
    }

    async fn start(
        &self,
        since: Generation,
        config: &DevServicesConfig,
    ) -> Result<ApplyOutcome, ProvisionError> {
        if self.generation() != since {
            tracing::debug!("Registry was torn down since the decision, not starting a broker");
            return Ok(ApplyOutcome::Inactive);
        }
        let Some(instance) = self.inner.provisioner.start(config).await? else {
            return Ok(ApplyOutcome::Inactive);
        };
        let params = instance.params().clone();

        let commit = {
            let mut state = self.inner.lock();
            if Generation(state.generation) != since {
                Commit::TornDown(instance)
            } else {
                let displaced = state.active.replace(ActiveBroker {
                    instance,
                    fingerprint: config.fingerprint(),
                });
                self.arm_hook(&mut state);
                Commit::Registered(displaced)
            }
        };

        let displaced = match commit {
            Commit::Registered(displaced) => displaced,
            Commit::TornDown(instance) => {
                tracing::info!("Shutdown ran while the AMQP broker was starting, stopping it");
                self.inner.provisioner.stop(instance).await;
                return Ok(ApplyOutcome::Inactive);
            }
        };

        if let Some(old) = displaced {
            tracing::warn!("Another AMQP broker was registered concurrently, stopping it");
            self.inner.provisioner.stop(old.instance).await;
        }

        tracing::info!("AMQP dev service broker running at {}:{}", params.host, params.port);
        Ok(ApplyOutcome::Started(params))
    }

    fn arm_hook(&self, state: &mut RegistryState) {
        if state.hook.is_some() {
            return;
        }

        let task: Arc<dyn ShutdownCallback> = Arc::new(TeardownTask {
            registry: Arc::downgrade(&self.inner),
        });
        let tokens = self
            .inner
            .notifiers
            .iter()
            .map(|notifier| (Arc::clone(notifier), notifier.on_shutdown(Arc::clone(&task))))
            .collect();

        tracing::debug!(
            "Armed AMQP broker teardown on {} notifier(s)",
            self.inner.notifiers.len()
        );
        state.hook = Some(HookRegistration { tokens });
    }
}
