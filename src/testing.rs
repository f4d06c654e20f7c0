//! Test doubles for the dev-service collaborators.
//!
//! Provides:
//! - [`StubRuntime`]: a container runtime that counts runs and releases
//! - [`RecordingPublisher`]: a config sink that counts publications
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use amqp_devservices::devservices::DevServiceController;
//! use amqp_devservices::testing::{RecordingPublisher, StubRuntime};
//!
//! let runtime = Arc::new(StubRuntime::new());
//! let sink = Arc::new(RecordingPublisher::new());
//! let controller = DevServiceController::new(runtime.clone(), sink.clone(), vec![]);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::devservices::AMQP_HOST_PROP;
use crate::devservices::publisher::{ConfigPublisher, InMemoryPublisher};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, RunningContainer, RuntimeError};

const FIRST_PORT: u16 = 32768;

#[derive(Default)]
struct Counters {
    runs: AtomicU32,
    started: AtomicU32,
    releases: AtomicU32,
    availability_checks: AtomicU32,
}

/// A configurable container runtime stub.
///
/// Supports:
/// - Availability toggling via [`set_available()`](Self::set_available)
/// - Start failure toggling via [`set_failing()`](Self::set_failing)
/// - Release failures via [`with_failing_release()`](Self::with_failing_release)
/// - Pausing a run mid-provisioning via [`hold_runs()`](Self::hold_runs)
/// - Call counting via [`runs()`](Self::runs) and [`releases()`](Self::releases)
///
/// Containers get `localhost` and increasing ports starting at 32768.
pub struct StubRuntime {
    available: AtomicBool,
    failing: AtomicBool,
    fail_release: bool,
    next_port: AtomicU16,
    counters: Arc<Counters>,
    last_spec: Mutex<Option<ContainerSpec>>,
    holding: AtomicBool,
    entered: Notify,
    resume: Notify,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            fail_release: false,
            next_port: AtomicU16::new(FIRST_PORT),
            counters: Arc::new(Counters::default()),
            last_spec: Mutex::new(None),
            holding: AtomicBool::new(false),
            entered: Notify::new(),
            resume: Notify::new(),
        }
    }

    /// A runtime that reports itself unavailable.
    pub fn unavailable() -> Self {
        let runtime = Self::new();
        runtime.set_available(false);
        runtime
    }

    /// A runtime whose containers never become ready.
    pub fn failing() -> Self {
        let runtime = Self::new();
        runtime.set_failing(true);
        runtime
    }

    /// Make every release report an error (it is still counted).
    pub fn with_failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// While set, every `run` parks until [`resume_held_run()`](Self::resume_held_run).
    pub fn hold_runs(&self, hold: bool) {
        self.holding.store(hold, Ordering::SeqCst);
    }

    /// Wait until a run is parked.
    pub async fn wait_for_held_run(&self) {
        self.entered.notified().await;
    }

    /// Let one parked run finish.
    pub fn resume_held_run(&self) {
        self.resume.notify_one();
    }

    /// Number of `run` calls, failed ones included.
    pub fn runs(&self) -> u32 {
        self.counters.runs.load(Ordering::SeqCst)
    }

    /// Number of underlying container releases.
    pub fn releases(&self) -> u32 {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn availability_checks(&self) -> u32 {
        self.counters.availability_checks.load(Ordering::SeqCst)
    }

    /// Containers started and not released yet.
    pub fn live(&self) -> u32 {
        let started = self.counters.started.load(Ordering::SeqCst);
        started.saturating_sub(self.releases())
    }

    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.last_spec
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn is_available(&self) -> bool {
        self.counters
            .availability_checks
            .fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn run(&self, spec: ContainerSpec) -> crate::runtime::Result<RunningContainer> {
        let run = self.counters.runs.fetch_add(1, Ordering::SeqCst);
        let name = format!("stub-broker-{run}");
        let timeout = spec.startup_timeout;
        let port = spec
            .fixed_port
            .unwrap_or_else(|| self.next_port.fetch_add(1, Ordering::SeqCst));
        *self.last_spec.lock().unwrap_or_else(PoisonError::into_inner) = Some(spec);

        if self.holding.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.resume.notified().await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(RuntimeError::ReadinessTimeout { name, timeout });
        }
        self.counters.started.fetch_add(1, Ordering::SeqCst);

        Ok(RunningContainer {
            host: "localhost".to_string(),
            port,
            handle: Box::new(StubContainer {
                name,
                fail_release: self.fail_release,
                counters: Arc::clone(&self.counters),
            }),
        })
    }
}

struct StubContainer {
    name: String,
    fail_release: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl ContainerHandle for StubContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn release(&self) -> crate::runtime::Result<()> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(RuntimeError::ReleaseFailed {
                name: self.name.clone(),
                reason: "stub release failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Config sink that records what was published.
#[derive(Default)]
pub struct RecordingPublisher {
    memory: InMemoryPublisher,
    default_writes: AtomicU32,
    diagnostic_writes: AtomicU32,
    publications: AtomicU32,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete publications (one per published host).
    pub fn publications(&self) -> u32 {
        self.publications.load(Ordering::SeqCst)
    }

    pub fn default_writes(&self) -> u32 {
        self.default_writes.load(Ordering::SeqCst)
    }

    pub fn diagnostic_writes(&self) -> u32 {
        self.diagnostic_writes.load(Ordering::SeqCst)
    }

    pub fn defaults(&self) -> BTreeMap<String, String> {
        self.memory.defaults()
    }

    pub fn diagnostics(&self) -> BTreeMap<String, String> {
        self.memory.diagnostics()
    }
}

impl ConfigPublisher for RecordingPublisher {
    fn publish_default(&self, key: &str, value: &str) {
        self.default_writes.fetch_add(1, Ordering::SeqCst);
        if key == AMQP_HOST_PROP {
            self.publications.fetch_add(1, Ordering::SeqCst);
        }
        self.memory.publish_default(key, value);
    }

    fn publish_diagnostic(&self, key: &str, value: &str) {
        self.diagnostic_writes.fetch_add(1, Ordering::SeqCst);
        self.memory.publish_diagnostic(key, value);
    }
}
