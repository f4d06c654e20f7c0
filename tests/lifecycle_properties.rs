//! Dev-service lifecycle tests across many cycles.
//!
//! Drives a [`DevServiceController`] through reload sequences the way a live
//! development loop would, with a counting container runtime and config sink.
//!
//! Collaborators:
//! - `StubRuntime` -- counts runs and releases, can be made unavailable or failing
//! - `RecordingPublisher` -- counts published coordinates
//! - `ShutdownSignal` -- the process and application-context termination paths

use std::sync::Arc;

use amqp_devservices::config::{LaunchMode, PropertyMap};
use amqp_devservices::devservices::{ApplyOutcome, DevServiceController};
use amqp_devservices::error::{DevServiceError, ProvisionError};
use amqp_devservices::shutdown::{ShutdownNotifier, ShutdownSignal};
use amqp_devservices::testing::{RecordingPublisher, StubRuntime};

const DEV: LaunchMode = LaunchMode::Development;

struct Harness {
    runtime: Arc<StubRuntime>,
    sink: Arc<RecordingPublisher>,
    process: Arc<ShutdownSignal>,
    context: Arc<ShutdownSignal>,
    controller: DevServiceController,
}

impl Harness {
    fn new() -> Self {
        Self::with_runtime(StubRuntime::new())
    }

    fn with_runtime(runtime: StubRuntime) -> Self {
        let runtime = Arc::new(runtime);
        let sink = Arc::new(RecordingPublisher::new());
        let process = Arc::new(ShutdownSignal::new("process"));
        let context = Arc::new(ShutdownSignal::new("application-context"));
        let controller = DevServiceController::new(
            runtime.clone(),
            sink.clone(),
            vec![
                process.clone() as Arc<dyn ShutdownNotifier>,
                context.clone() as Arc<dyn ShutdownNotifier>,
            ],
        );
        Self {
            runtime,
            sink,
            process,
            context,
            controller,
        }
    }

    async fn cycle(&self, properties: &PropertyMap) -> ApplyOutcome {
        self.controller.run_cycle(properties, DEV).await.unwrap()
    }
}

/// An application with one AMQP channel that relies on discovery.
fn app() -> PropertyMap {
    PropertyMap::new()
        .with("mp.messaging.incoming.prices.connector", "smallrye-amqp")
        .with("mp.messaging.outgoing.orders.connector", "smallrye-amqp")
}

// ---------------------------------------------------------------------------
// Reuse and restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_config_reuses_one_broker() {
    let h = Harness::new();

    let first = h.cycle(&app()).await;
    for _ in 0..5 {
        let outcome = h.cycle(&app()).await;
        assert_eq!(outcome, ApplyOutcome::Reused(first.params().unwrap().clone()));
    }

    assert_eq!(h.runtime.runs(), 1);
    assert_eq!(h.runtime.releases(), 0);
    assert_eq!(h.sink.publications(), 1);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn image_change_restarts_broker() {
    let h = Harness::new();
    h.cycle(&app()).await;

    let changed = app().with(
        "amqp.devservices.image-name",
        "quay.io/artemiscloud/activemq-artemis-broker:1.0.26",
    );
    let outcome = h.cycle(&changed).await;

    assert!(outcome.is_started());
    assert_eq!(h.runtime.runs(), 2);
    assert_eq!(h.runtime.releases(), 1);
    assert_eq!(h.runtime.live(), 1);
    assert_eq!(h.sink.publications(), 2);
    assert_eq!(
        h.runtime.last_spec().unwrap().image,
        "quay.io/artemiscloud/activemq-artemis-broker:1.0.26"
    );
    h.controller.shutdown().await;
}

#[tokio::test]
async fn port_change_restarts_broker_on_new_port() {
    let h = Harness::new();
    h.cycle(&app()).await;

    let outcome = h.cycle(&app().with("amqp.devservices.port", "5673")).await;

    assert_eq!(outcome.params().map(|p| p.port), Some(5673));
    assert_eq!(h.runtime.runs(), 2);
    assert_eq!(h.runtime.releases(), 1);
    assert_eq!(
        h.sink.defaults().get("amqp-port").map(String::as_str),
        Some("5673")
    );
    h.controller.shutdown().await;
}

#[tokio::test]
async fn extra_args_change_keeps_broker() {
    let h = Harness::new();
    h.cycle(&app()).await;

    let outcome = h
        .cycle(&app().with("amqp.devservices.extra-args", "--no-autotune"))
        .await;

    assert!(matches!(outcome, ApplyOutcome::Reused(_)));
    assert_eq!(h.runtime.runs(), 1);
    assert_eq!(h.runtime.releases(), 0);
    h.controller.shutdown().await;
}

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabling_stops_once_until_reenabled() {
    let h = Harness::new();
    h.cycle(&app()).await;

    let disabled = app().with("amqp.devservices.enabled", "false");
    for _ in 0..3 {
        assert_eq!(h.cycle(&disabled).await, ApplyOutcome::Inactive);
    }
    assert_eq!(h.runtime.releases(), 1);
    assert_eq!(h.runtime.runs(), 1);

    assert!(h.cycle(&app()).await.is_started());
    assert_eq!(h.runtime.runs(), 2);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn global_override_tears_down_running_broker() {
    let h = Harness::new();
    h.cycle(&app()).await;

    let external = app().with("amqp-host", "broker.internal");
    assert_eq!(h.cycle(&external).await, ApplyOutcome::Inactive);
    assert_eq!(h.cycle(&external).await, ApplyOutcome::Inactive);

    assert_eq!(h.runtime.releases(), 1);
    assert_eq!(h.runtime.live(), 0);
    assert!(!h.controller.registry().is_active());
}

#[tokio::test]
async fn global_port_override_also_skips() {
    let h = Harness::new();

    let outcome = h.cycle(&app().with("amqp-port", "5672")).await;

    assert_eq!(outcome, ApplyOutcome::Inactive);
    assert_eq!(h.runtime.runs(), 0);
    assert_eq!(h.runtime.availability_checks(), 0);
}

#[tokio::test]
async fn configured_channels_do_not_start_broker() {
    let h = Harness::new();
    let props = PropertyMap::new()
        .with("mp.messaging.incoming.prices.connector", "smallrye-amqp")
        .with("mp.messaging.incoming.prices.host", "broker.internal");

    assert_eq!(h.cycle(&props).await, ApplyOutcome::Inactive);
    assert_eq!(h.runtime.runs(), 0);
}

#[tokio::test]
async fn skip_and_reuse_publish_nothing() {
    let h = Harness::new();
    h.cycle(&app()).await;
    let after_start = (h.sink.default_writes(), h.sink.diagnostic_writes());

    h.cycle(&app()).await;
    h.cycle(&app().with("amqp.devservices.enabled", "false")).await;

    assert_eq!(
        (h.sink.default_writes(), h.sink.diagnostic_writes()),
        after_start
    );
    assert_eq!(after_start, (4, 4));
}

#[tokio::test]
async fn unavailable_runtime_skips_then_recovers() {
    let h = Harness::with_runtime(StubRuntime::unavailable());

    assert_eq!(h.cycle(&app()).await, ApplyOutcome::Inactive);
    assert_eq!(h.runtime.runs(), 0);

    h.runtime.set_available(true);
    assert!(h.cycle(&app()).await.is_started());
    h.controller.shutdown().await;
}

// ---------------------------------------------------------------------------
// Stop and teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn double_stop_releases_once() {
    let h = Harness::new();
    h.cycle(&app()).await;

    assert!(h.controller.registry().stop().await);
    assert!(!h.controller.registry().stop().await);
    h.controller.shutdown().await;

    assert_eq!(h.runtime.releases(), 1);
}

#[tokio::test]
async fn process_signal_tears_down_and_cancels_context_hook() {
    let h = Harness::new();
    h.cycle(&app()).await;
    assert_eq!(h.context.pending(), 1);

    h.process.fire().await;

    assert_eq!(h.runtime.releases(), 1);
    assert_eq!(h.context.pending(), 0);
    assert!(!h.controller.registry().hook_installed());

    h.context.fire().await;
    assert_eq!(h.runtime.releases(), 1);
}

#[tokio::test]
async fn context_signal_tears_down_and_hook_rearms() {
    let h = Harness::new();
    h.cycle(&app()).await;

    h.context.fire().await;
    assert_eq!(h.runtime.releases(), 1);
    assert_eq!(h.process.pending(), 0);

    assert!(h.cycle(&app()).await.is_started());
    assert!(h.controller.registry().hook_installed());
    assert_eq!(h.process.pending(), 1);
    assert_eq!(h.context.pending(), 1);

    h.process.fire().await;
    assert_eq!(h.runtime.releases(), 2);
    assert_eq!(h.runtime.live(), 0);
}

#[tokio::test]
async fn shutdown_during_provisioning_leaves_nothing_running() {
    let h = Harness::new();
    h.cycle(&app()).await;

    h.runtime.hold_runs(true);
    let controller = h.controller.clone();
    let cycle = tokio::spawn(async move {
        let props = app();
        controller.run_cycle(&props, LaunchMode::Test).await
    });
    h.runtime.wait_for_held_run().await;

    h.process.fire().await;
    h.runtime.resume_held_run();
    let outcome = cycle.await.unwrap().unwrap();

    assert_eq!(outcome, ApplyOutcome::Inactive);
    assert_eq!(h.runtime.live(), 0);
    assert!(!h.controller.registry().hook_installed());
    assert_eq!(h.process.pending(), 0);
    assert_eq!(h.context.pending(), 0);
    assert_eq!(h.sink.publications(), 1);
}

#[tokio::test]
async fn cycle_after_shutdown_starts_and_rearms() {
    let h = Harness::new();
    h.cycle(&app()).await;
    h.process.fire().await;

    assert!(h.cycle(&app()).await.is_started());
    assert_eq!(h.process.pending(), 1);

    h.controller.shutdown().await;
    assert_eq!(h.runtime.live(), 0);
}

#[tokio::test]
async fn failing_release_is_not_retried() {
    let h = Harness::with_runtime(StubRuntime::new().with_failing_release());
    h.cycle(&app()).await;

    h.process.fire().await;
    h.controller.shutdown().await;

    assert_eq!(h.runtime.releases(), 1);
    assert!(!h.controller.registry().is_active());
}

// ---------------------------------------------------------------------------
// Launch modes and failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mode_restarts_every_cycle() {
    let h = Harness::new();

    for _ in 0..3 {
        let outcome = h
            .controller
            .run_cycle(&app(), LaunchMode::Test)
            .await
            .unwrap();
        assert!(outcome.is_started());
    }

    assert_eq!(h.runtime.runs(), 3);
    assert_eq!(h.runtime.releases(), 2);
    assert_eq!(h.sink.publications(), 3);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn normal_mode_never_touches_registry() {
    let h = Harness::new();

    let outcome = h
        .controller
        .run_cycle(&app(), LaunchMode::Normal)
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Inactive);
    assert_eq!(h.runtime.availability_checks(), 0);
    assert!(!h.controller.registry().hook_installed());
}

#[tokio::test]
async fn start_failure_leaves_slot_empty_and_next_cycle_retries() {
    let h = Harness::with_runtime(StubRuntime::failing());

    let err = h.controller.run_cycle(&app(), DEV).await.unwrap_err();
    assert!(matches!(
        err,
        DevServiceError::Provision(ProvisionError::Runtime(_))
    ));
    assert!(!h.controller.registry().is_active());
    assert_eq!(h.sink.publications(), 0);

    h.runtime.set_failing(false);
    assert!(h.cycle(&app()).await.is_started());
    assert_eq!(h.runtime.runs(), 2);
    h.controller.shutdown().await;
}

#[tokio::test]
async fn unsupported_image_fails_without_running() {
    let h = Harness::new();
    let props = app().with("amqp.devservices.image-name", "rabbitmq:3-management");

    let err = h.controller.run_cycle(&props, DEV).await.unwrap_err();

    assert!(matches!(
        err,
        DevServiceError::Provision(ProvisionError::UnsupportedImage { .. })
    ));
    assert_eq!(h.runtime.runs(), 0);
}

#[tokio::test]
async fn property_file_drives_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("application.toml");
    std::fs::write(
        &path,
        r#"
[mp.messaging.incoming.prices]
connector = "smallrye-amqp"

[amqp.devservices]
port = "5680"
"#,
    )
    .unwrap();

    let h = Harness::new();
    let props = PropertyMap::from_toml_file(&path).unwrap();
    let outcome = h.cycle(&props).await;

    assert_eq!(outcome.params().map(|p| p.port), Some(5680));
    assert_eq!(
        h.sink.diagnostics().get("amqp-host").map(String::as_str),
        Some("localhost")
    );
    h.controller.shutdown().await;
}
