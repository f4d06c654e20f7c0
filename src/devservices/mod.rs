//! AMQP dev service lifecycle.
//!
//! On every build or reload cycle the controller decides whether the
//! application needs a dev-managed AMQP broker and, if so, whether the one
//! already running can be kept.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DevServiceController                             │
//! │                                                                         │
//! │   run_cycle(properties, mode)                                           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │   ┌──────────────┐     ┌──────────────┐     ┌────────────────────────┐  │
//! │   │ Resolve      │────▶│ decide()     │────▶│ LifecycleRegistry      │  │
//! │   │ config       │     │ skip/reuse/  │     │ apply()                │  │
//! │   └──────────────┘     │ restart/start│     └────────────────────────┘  │
//! │                        └──────────────┘          │            │         │
//! │                                                  ▼            ▼         │
//! │                                  ┌──────────────────┐ ┌──────────────┐  │
//! │                                  │ BrokerProvisioner│ │ Teardown hook│  │
//! │                                  │ (container)      │ │ (armed once) │  │
//! │                                  └──────────────────┘ └──────────────┘  │
//! │                                          │                              │
//! │                                          ▼                              │
//! │                                  ┌──────────────────┐                   │
//! │                                  │ ResultPublisher  │ (start only)      │
//! │                                  └──────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod decision;
pub mod fingerprint;
pub mod provisioner;
pub mod publisher;
pub mod registry;
pub mod scanner;

pub use controller::DevServiceController;
pub use decision::{AMQP_HOST_PROP, AMQP_PORT_PROP, Decision, DecisionInput, SkipReason, decide};
pub use fingerprint::ConfigFingerprint;
pub use provisioner::{BrokerInstance, BrokerParams, BrokerProvisioner, ReleaseHandle};
pub use publisher::{ConfigPublisher, EnvFilePublisher, InMemoryPublisher, ResultPublisher};
pub use registry::{ApplyOutcome, Generation, LifecycleRegistry};
pub use scanner::has_channel_needing_discovery;
