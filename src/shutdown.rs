//! Cancellable termination callbacks.
//!
//! A [`ShutdownSignal`] stands for one way the owning context can end: the
//! whole process exiting, or a reloadable context being discarded. Callbacks
//! register on any number of signals and get a [`ShutdownToken`] back for
//! each; whichever signal fires first runs the callback, and the callback
//! cancels its other registrations with those tokens.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

/// Work to run when a termination path fires.
#[async_trait]
pub trait ShutdownCallback: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn run(&self);
}

/// Identifies one registration on one notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShutdownToken(u64);

/// A termination path callbacks can register with.
pub trait ShutdownNotifier: Send + Sync {
    /// Register `callback` to run when this path fires.
    fn on_shutdown(&self, callback: Arc<dyn ShutdownCallback>) -> ShutdownToken;

    /// Remove a registration. Returns false if it already ran or was cancelled.
    fn cancel(&self, token: ShutdownToken) -> bool;
}

#[derive(Default)]
struct SignalState {
    next_id: u64,
    callbacks: BTreeMap<u64, Arc<dyn ShutdownCallback>>,
}

/// In-process notifier fired explicitly with [`fire`](Self::fire).
pub struct ShutdownSignal {
    name: String,
    state: Mutex<SignalState>,
}

impl ShutdownSignal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SignalState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of callbacks still registered.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    /// Run and remove every registered callback, in registration order.
    ///
    /// Callbacks run after the internal lock is released, so they may cancel
    /// or register on this same signal.
    pub async fn fire(&self) {
        let callbacks = std::mem::take(
            &mut self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks,
        );

        if !callbacks.is_empty() {
            tracing::debug!(
                "Shutdown signal '{}' running {} callback(s)",
                self.name,
                callbacks.len()
            );
        }

        for callback in callbacks.into_values() {
            tracing::debug!("Running shutdown callback '{}'", callback.name());
            callback.run().await;
        }
    }
}

impl ShutdownNotifier for ShutdownSignal {
    fn on_shutdown(&self, callback: Arc<dyn ShutdownCallback>) -> ShutdownToken {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.insert(id, callback);
        ShutdownToken(id)
    }

    fn cancel(&self, token: ShutdownToken) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .remove(&token.0)
            .is_some()
    }
}

/// Listen for a termination request (Ctrl-C, or SIGINT/SIGTERM on unix).
///
/// The listeners are installed when this is called, not when the future is
/// first polled, so a signal that arrives while a cycle is still running is
/// held until the future is awaited. Must be called inside a tokio runtime.
#[cfg(unix)]
pub fn wait_for_termination() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());

    async move {
        match (interrupt, terminate) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => tracing::debug!("Received SIGINT"),
                    _ = terminate.recv() => tracing::debug!("Received SIGTERM"),
                }
            }
            (Ok(mut interrupt), Err(e)) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                interrupt.recv().await;
            }
            (Err(e), _) => {
                tracing::warn!("Cannot listen for SIGINT: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
}

/// Listen for a termination request (Ctrl-C).
#[cfg(not(unix))]
pub fn wait_for_termination() -> impl Future<Output = ()> + Send + 'static {
    async {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        runs: AtomicU32,
    }

    #[async_trait]
    impl ShutdownCallback for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter {
            runs: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_fire_runs_each_callback_once() {
        let signal = ShutdownSignal::new("process");
        let cb = counter();
        signal.on_shutdown(cb.clone());
        signal.on_shutdown(cb.clone());
        assert_eq!(signal.pending(), 2);

        signal.fire().await;
        signal.fire().await;

        assert_eq!(cb.runs.load(Ordering::SeqCst), 2);
        assert_eq!(signal.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_callback_does_not_run() {
        let signal = ShutdownSignal::new("context");
        let cb = counter();
        let token = signal.on_shutdown(cb.clone());

        assert!(signal.cancel(token));
        assert!(!signal.cancel(token));

        signal.fire().await;
        assert_eq!(cb.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_fire_reports_false() {
        let signal = ShutdownSignal::new("process");
        let token = signal.on_shutdown(counter());
        signal.fire().await;
        assert!(!signal.cancel(token));
    }

    #[test]
    fn test_tokens_are_unique() {
        let signal = ShutdownSignal::new("process");
        let a = signal.on_shutdown(counter());
        let b = signal.on_shutdown(counter());
        assert_ne!(a, b);
        assert_eq!(signal.name(), "process");
    }

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ShutdownCallback for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        async fn run(&self) {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(self.label);
        }
    }

    #[test]
    fn test_fire_runs_in_registration_order() {
        let signal = ShutdownSignal::new("process");
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            signal.on_shutdown(Arc::new(Recorder {
                label,
                log: Arc::clone(&log),
            }));
        }

        tokio_test::block_on(signal.fire());

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_termination_listener_installed_before_first_poll() {
        let terminate = wait_for_termination();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(std::time::Duration::from_secs(5), terminate)
            .await
            .expect("SIGTERM sent before the first poll is observed");
    }
}
