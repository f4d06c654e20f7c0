//! Start/reuse/restart/skip decision for one cycle.

use crate::config::{DevServicesConfig, PropertySource};
use crate::devservices::fingerprint::ConfigFingerprint;
use crate::devservices::scanner::has_channel_needing_discovery;
use crate::runtime::ContainerRuntime;

/// Global broker host override.
pub const AMQP_HOST_PROP: &str = "amqp-host";
/// Global broker port override.
pub const AMQP_PORT_PROP: &str = "amqp-port";

/// Why no dev broker should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `amqp.devservices.enabled` is false.
    Disabled,
    /// `amqp-host` or `amqp-port` points at an external broker.
    ExternallyConfigured,
    /// Every AMQP channel has its own host or port.
    ChannelsConfigured,
    /// The container runtime cannot be reached.
    RuntimeUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disabled => "disabled",
            Self::ExternallyConfigured => "externally configured",
            Self::ChannelsConfigured => "channels configured",
            Self::RuntimeUnavailable => "runtime unavailable",
        };
        write!(f, "{}", s)
    }
}

/// What the registry should do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No broker wanted. Any running one is stopped.
    Skip(SkipReason),
    /// Keep the running broker and its published parameters.
    Reuse,
    /// Stop the running broker, then start a new one.
    Restart,
    /// Start a broker; none is running.
    Start,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip(reason) => write!(f, "skip ({})", reason),
            Self::Reuse => write!(f, "reuse"),
            Self::Restart => write!(f, "restart"),
            Self::Start => write!(f, "start"),
        }
    }
}

/// Everything [`decide`] looks at.
pub struct DecisionInput<'a> {
    pub config: &'a DevServicesConfig,
    pub properties: &'a dyn PropertySource,
    pub runtime: &'a dyn ContainerRuntime,
    /// Fingerprint of the running broker, if any.
    pub current: Option<&'a ConfigFingerprint>,
    /// Restart a running broker even when nothing changed.
    pub full_reset: bool,
}

/// Decide what to do with the dev broker.
///
/// The checks short-circuit in order: disabled, global override, channel
/// scan, runtime availability, then the comparison with the running broker.
pub async fn decide(input: DecisionInput<'_>) -> Decision {
    if !input.config.enabled {
        tracing::debug!("Not starting dev services for AMQP, as it has been disabled in the config");
        return Decision::Skip(SkipReason::Disabled);
    }

    if input.properties.is_present(AMQP_HOST_PROP) || input.properties.is_present(AMQP_PORT_PROP)
    {
        tracing::debug!(
            "Not starting dev services for AMQP, {} and/or {} are configured",
            AMQP_HOST_PROP,
            AMQP_PORT_PROP
        );
        return Decision::Skip(SkipReason::ExternallyConfigured);
    }

    if !has_channel_needing_discovery(input.properties) {
        tracing::debug!("Not starting dev services for AMQP, all the channels are configured");
        return Decision::Skip(SkipReason::ChannelsConfigured);
    }

    if !input.runtime.is_available().await {
        tracing::warn!("Docker isn't working, please configure the AMQP broker location");
        return Decision::Skip(SkipReason::RuntimeUnavailable);
    }

    let Some(current) = input.current else {
        return Decision::Start;
    };

    if input.full_reset {
        tracing::debug!("Full reset requested, restarting the AMQP broker");
        return Decision::Restart;
    }

    if *current != input.config.fingerprint() {
        tracing::debug!("AMQP dev service configuration changed, restarting the broker");
        return Decision::Restart;
    }

    Decision::Reuse
}
