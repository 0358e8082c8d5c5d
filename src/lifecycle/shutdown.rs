//! Shutdown coordination for the server.
//!
//! The coordinator decouples *who* asks for shutdown (a [`ShutdownTrigger`])
//! from *what* must be released (cleanup callbacks). Any trigger may call
//! [`ShutdownCoordinator::begin_shutdown`]; the sequence below runs once per
//! process no matter how many triggers fire:
//!
//! ```text
//! begin hooks (every trigger)
//!     → cleanup callbacks (registration order, one at a time)
//!     → end hooks (every trigger, registration order)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Error returned by a cleanup callback.
pub type CleanupError = Box<dyn std::error::Error + Send + Sync>;

/// Future produced by a cleanup callback.
pub type CleanupFuture = Pin<Box<dyn Future<Output = Result<(), CleanupError>> + Send>>;

type CleanupAction = Arc<dyn Fn() -> CleanupFuture + Send + Sync>;

/// Errors raised by a trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("failed to install handler for {signal}: {source}")]
    SignalInstall {
        signal: crate::lifecycle::signals::ShutdownSignal,
        #[source]
        source: std::io::Error,
    },
    #[error("trigger hook failed: {0}")]
    Hook(String),
}

/// Errors raised by the coordinator itself.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("failed to start shutdown trigger `{name}`")]
    TriggerStart {
        name: String,
        #[source]
        source: TriggerError,
    },
    #[error("triggers have already been started")]
    AlreadyStarted,
    #[error("shutdown is already in progress")]
    ShutdownInProgress,
}

/// A source that can request a graceful shutdown.
pub trait ShutdownTrigger: Send + Sync {
    /// Stable name, used for diagnostics only.
    fn name(&self) -> &str;

    /// Begin watching for shutdown requests. Must not block.
    fn start(self: Arc<Self>, coordinator: Arc<ShutdownCoordinator>) -> Result<(), TriggerError>;

    /// Called on every trigger before any cleanup callback runs.
    fn on_shutdown_begin(&self) -> Result<(), TriggerError>;

    /// Called on every trigger after all cleanup callbacks have returned.
    fn on_shutdown_end(&self) -> Result<(), TriggerError>;
}

/// A named unit of resource-release work.
#[derive(Clone)]
pub struct CleanupCallback {
    name: String,
    action: CleanupAction,
}

impl CleanupCallback {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CleanupCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupCallback").field("name", &self.name).finish()
    }
}

/// How a single cleanup callback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    Completed,
    Failed(String),
    TimedOut,
}

/// Per-callback outcome recorded in a [`ShutdownReport`].
#[derive(Debug, Clone)]
pub struct CleanupOutcome {
    pub name: String,
    pub status: CleanupStatus,
}

/// Summary of one shutdown sequence.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Name of the trigger that started the sequence.
    pub initiator: String,
    /// Outcomes in execution order.
    pub cleanups: Vec<CleanupOutcome>,
    /// Number of begin/end hooks that failed.
    pub hook_failures: usize,
}

impl ShutdownReport {
    /// True when every callback and hook succeeded.
    pub fn is_clean(&self) -> bool {
        self.hook_failures == 0
            && self
                .cleanups
                .iter()
                .all(|c| c.status == CleanupStatus::Completed)
    }
}

/// Owns the registered triggers and cleanup callbacks and runs the shutdown
/// sequence exactly once.
pub struct ShutdownCoordinator {
    triggers: Mutex<Vec<Arc<dyn ShutdownTrigger>>>,
    callbacks: Mutex<Vec<CleanupCallback>>,
    started: AtomicBool,
    in_progress: AtomicBool,
    cleanup_timeout: Option<Duration>,
    /// Broadcast channel notified when shutdown begins.
    notify: broadcast::Sender<()>,
    finished: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no per-callback budget.
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        let (finished, _) = watch::channel(false);
        Self {
            triggers: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            in_progress: AtomicBool::new(false),
            cleanup_timeout: None,
            notify,
            finished,
        }
    }

    /// Bound each cleanup callback by `timeout`; overrunning callbacks are abandoned.
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    /// Add a trigger. Only allowed before [`start_all`](Self::start_all).
    pub fn register_trigger(&self, trigger: Arc<dyn ShutdownTrigger>) -> Result<(), ShutdownError> {
        if self.started.load(Ordering::Acquire) {
            return Err(ShutdownError::AlreadyStarted);
        }
        tracing::debug!(trigger = trigger.name(), "Shutdown trigger registered");
        lock(&self.triggers).push(trigger);
        Ok(())
    }

    /// Append a cleanup callback. Callbacks run in registration order.
    pub fn register_cleanup<F, Fut>(
        &self,
        name: impl Into<String>,
        action: F,
    ) -> Result<(), ShutdownError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CleanupError>> + Send + 'static,
    {
        if self.in_progress.load(Ordering::Acquire) {
            return Err(ShutdownError::ShutdownInProgress);
        }
        let name = name.into();
        tracing::debug!(callback = %name, "Cleanup callback registered");
        lock(&self.callbacks).push(CleanupCallback {
            name,
            action: Arc::new(move || Box::pin(action()) as CleanupFuture),
        });
        Ok(())
    }

    /// Start every registered trigger. Fails fast on the first error; triggers
    /// already started are left running.
    pub fn start_all(self: &Arc<Self>) -> Result<(), ShutdownError> {
        self.started.store(true, Ordering::Release);
        for trigger in self.triggers_snapshot() {
            let name = trigger.name().to_string();
            trigger
                .start(Arc::clone(self))
                .map_err(|source| ShutdownError::TriggerStart {
                    name: name.clone(),
                    source,
                })?;
            tracing::info!(trigger = %name, "Shutdown trigger started");
        }
        Ok(())
    }

    /// Run the shutdown sequence on behalf of `initiator`.
    ///
    /// Returns `None` when another caller already owns the sequence.
    pub async fn begin_shutdown(&self, initiator: &dyn ShutdownTrigger) -> Option<ShutdownReport> {
        if !self.claim(initiator) {
            return None;
        }
        Some(self.run_sequence(initiator).await)
    }

    /// Claim the sequence now and run it on a background task.
    ///
    /// The claim is decided before this returns, so callers that must answer
    /// at once (an HTTP handler) know whether they won.
    pub fn spawn_shutdown(
        self: &Arc<Self>,
        initiator: Arc<dyn ShutdownTrigger>,
    ) -> Option<JoinHandle<ShutdownReport>> {
        if !self.claim(initiator.as_ref()) {
            return None;
        }
        let coordinator = Arc::clone(self);
        Some(tokio::spawn(async move {
            coordinator.run_sequence(initiator.as_ref()).await
        }))
    }

    fn claim(&self, initiator: &dyn ShutdownTrigger) -> bool {
        let claimed = self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !claimed {
            tracing::info!(
                initiator = initiator.name(),
                "Shutdown already in progress, ignoring request"
            );
        }
        claimed
    }

    async fn run_sequence(&self, initiator: &dyn ShutdownTrigger) -> ShutdownReport {
        tracing::info!(initiator = initiator.name(), "Graceful shutdown started");
        let _ = self.notify.send(());

        let triggers = self.triggers_snapshot();
        let callbacks = lock(&self.callbacks).clone();
        let mut report = ShutdownReport {
            initiator: initiator.name().to_string(),
            cleanups: Vec::with_capacity(callbacks.len()),
            hook_failures: 0,
        };

        for trigger in &triggers {
            if !run_hook(trigger.as_ref(), "begin", |t| t.on_shutdown_begin()) {
                report.hook_failures += 1;
            }
        }

        for callback in &callbacks {
            let status = self.run_cleanup(callback).await;
            report.cleanups.push(CleanupOutcome {
                name: callback.name.clone(),
                status,
            });
        }

        tracing::info!(
            callbacks = report.cleanups.len(),
            clean = report.is_clean(),
            "Cleanup finished, running shutdown end hooks"
        );

        for trigger in &triggers {
            if !run_hook(trigger.as_ref(), "end", |t| t.on_shutdown_end()) {
                report.hook_failures += 1;
            }
        }

        self.finished.send_replace(true);
        report
    }

    async fn run_cleanup(&self, callback: &CleanupCallback) -> CleanupStatus {
        tracing::info!(callback = %callback.name, "Running cleanup callback");
        let mut task = tokio::spawn((callback.action)());

        let joined = match self.cleanup_timeout {
            Some(budget) => match tokio::time::timeout(budget, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    tracing::error!(
                        callback = %callback.name,
                        budget = ?budget,
                        "Cleanup callback exceeded its budget, abandoning"
                    );
                    return CleanupStatus::TimedOut;
                }
            },
            None => (&mut task).await,
        };

        match joined {
            Ok(Ok(())) => {
                tracing::info!(callback = %callback.name, "Cleanup callback completed");
                CleanupStatus::Completed
            }
            Ok(Err(e)) => {
                tracing::error!(callback = %callback.name, error = %e, "Cleanup callback failed");
                CleanupStatus::Failed(e.to_string())
            }
            Err(e) => {
                tracing::error!(callback = %callback.name, error = %e, "Cleanup callback panicked");
                CleanupStatus::Failed(e.to_string())
            }
        }
    }

    /// Registered trigger names, in the order their hooks run.
    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers_snapshot()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// True once any trigger has started the shutdown sequence.
    pub fn is_shutting_down(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Subscribe to the shutdown-begin notification.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Resolve once the sequence, including every end hook, has finished.
    pub async fn wait_for_completion(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    fn triggers_snapshot(&self) -> Vec<Arc<dyn ShutdownTrigger>> {
        lock(&self.triggers).clone()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("triggers", &self.trigger_names())
            .field("callbacks", &*lock(&self.callbacks))
            .field("in_progress", &self.is_shutting_down())
            .finish()
    }
}

/// Run one trigger hook, isolating errors and panics. Returns false on failure.
fn run_hook(
    trigger: &dyn ShutdownTrigger,
    phase: &'static str,
    hook: impl FnOnce(&dyn ShutdownTrigger) -> Result<(), TriggerError>,
) -> bool {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(trigger)));
    match outcome {
        Ok(Ok(())) => {
            tracing::debug!(trigger = trigger.name(), phase, "Shutdown hook completed");
            true
        }
        Ok(Err(e)) => {
            tracing::error!(trigger = trigger.name(), phase, error = %e, "Shutdown hook failed");
            false
        }
        Err(_) => {
            tracing::error!(trigger = trigger.name(), phase, "Shutdown hook panicked");
            false
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct RecordingTrigger {
        name: String,
        trace: Trace,
        fail_begin: bool,
    }

    impl RecordingTrigger {
        fn new(name: &str, trace: &Trace) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                trace: Arc::clone(trace),
                fail_begin: false,
            })
        }
    }

    impl ShutdownTrigger for RecordingTrigger {
        fn name(&self) -> &str {
            &self.name
        }

        fn start(self: Arc<Self>, _: Arc<ShutdownCoordinator>) -> Result<(), TriggerError> {
            self.trace.lock().unwrap().push(format!("{}:start", self.name));
            Ok(())
        }

        fn on_shutdown_begin(&self) -> Result<(), TriggerError> {
            self.trace.lock().unwrap().push(format!("{}:begin", self.name));
            if self.fail_begin {
                return Err(TriggerError::Hook("boom".into()));
            }
            Ok(())
        }

        fn on_shutdown_end(&self) -> Result<(), TriggerError> {
            self.trace.lock().unwrap().push(format!("{}:end", self.name));
            Ok(())
        }
    }

    struct FailingStart;

    impl ShutdownTrigger for FailingStart {
        fn name(&self) -> &str {
            "failing"
        }

        fn start(self: Arc<Self>, _: Arc<ShutdownCoordinator>) -> Result<(), TriggerError> {
            Err(TriggerError::Hook("cannot watch".into()))
        }

        fn on_shutdown_begin(&self) -> Result<(), TriggerError> {
            Ok(())
        }

        fn on_shutdown_end(&self) -> Result<(), TriggerError> {
            Ok(())
        }
    }

    fn record(coordinator: &ShutdownCoordinator, name: &'static str, trace: &Trace) {
        let trace = Arc::clone(trace);
        coordinator
            .register_cleanup(name, move || {
                let trace = Arc::clone(&trace);
                async move {
                    trace.lock().unwrap().push(name.to_string());
                    Ok(())
                }
            })
            .unwrap();
    }

    #[tokio::test]
    async fn callbacks_run_in_registration_order_between_hooks() {
        let trace: Trace = Arc::default();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let signal = RecordingTrigger::new("signal", &trace);
        let admin = RecordingTrigger::new("admin", &trace);
        coordinator.register_trigger(signal.clone()).unwrap();
        coordinator.register_trigger(admin.clone()).unwrap();
        record(&coordinator, "A", &trace);
        record(&coordinator, "B", &trace);
        record(&coordinator, "C", &trace);
        coordinator.start_all().unwrap();

        let report = coordinator.begin_shutdown(admin.as_ref()).await.unwrap();

        assert_eq!(report.initiator, "admin");
        assert!(report.is_clean());
        assert_eq!(
            *trace.lock().unwrap(),
            vec![
                "signal:start", "admin:start", "signal:begin", "admin:begin", "A", "B", "C",
                "signal:end", "admin:end",
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_begin_runs_callbacks_once() {
        let trace: Trace = Arc::default();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::default()).collect();
        for (i, count) in counts.iter().enumerate() {
            let count = Arc::clone(count);
            coordinator
                .register_cleanup(format!("cb-{}", i), move || {
                    let count = Arc::clone(&count);
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .unwrap();
        }

        let first = RecordingTrigger::new("first", &trace);
        let second = RecordingTrigger::new("second", &trace);
        let (a, b) = tokio::join!(
            {
                let coordinator = Arc::clone(&coordinator);
                let first = Arc::clone(&first);
                tokio::spawn(async move { coordinator.begin_shutdown(first.as_ref()).await })
            },
            {
                let coordinator = Arc::clone(&coordinator);
                let second = Arc::clone(&second);
                tokio::spawn(async move { coordinator.begin_shutdown(second.as_ref()).await })
            }
        );

        let reports = [a.unwrap(), b.unwrap()];
        assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 1);
        for count in &counts {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
        assert!(coordinator.begin_shutdown(first.as_ref()).await.is_none());
    }

    #[tokio::test]
    async fn spawned_shutdown_claims_before_returning() {
        let trace: Trace = Arc::default();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        record(&coordinator, "http", &trace);
        let first = RecordingTrigger::new("first", &trace);
        let second = RecordingTrigger::new("second", &trace);

        // Neither task has run yet; the second claim must already lose.
        let running = coordinator.spawn_shutdown(first.clone()).unwrap();
        assert!(coordinator.is_shutting_down());
        assert!(coordinator.spawn_shutdown(second.clone()).is_none());
        assert!(coordinator.begin_shutdown(second.as_ref()).await.is_none());

        let report = running.await.unwrap();
        assert_eq!(report.initiator, "first");
        assert_eq!(*trace.lock().unwrap(), vec!["http"]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_sequence() {
        let trace: Trace = Arc::default();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let broken = Arc::new(RecordingTrigger {
            name: "broken".into(),
            trace: Arc::clone(&trace),
            fail_begin: true,
        });
        let healthy = RecordingTrigger::new("healthy", &trace);
        coordinator.register_trigger(broken.clone()).unwrap();
        coordinator.register_trigger(healthy.clone()).unwrap();

        coordinator
            .register_cleanup("database", || async { Err::<(), CleanupError>("connection reset".into()) })
            .unwrap();
        coordinator
            .register_cleanup("panicky", || async {
                let broken: Result<(), CleanupError> = Err("cleanup bug".into());
                broken.expect("cleanup bug");
                Ok(())
            })
            .unwrap();
        record(&coordinator, "http", &trace);

        let report = coordinator.begin_shutdown(healthy.as_ref()).await.unwrap();

        assert_eq!(report.hook_failures, 1);
        assert_eq!(report.cleanups[0].status, CleanupStatus::Failed("connection reset".into()));
        assert!(matches!(report.cleanups[1].status, CleanupStatus::Failed(_)));
        assert_eq!(report.cleanups[2].status, CleanupStatus::Completed);
        assert_eq!(
            *trace.lock().unwrap(),
            vec!["broken:begin", "healthy:begin", "http", "broken:end", "healthy:end"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callback_is_abandoned_after_budget() {
        let trace: Trace = Arc::default();
        let coordinator =
            Arc::new(ShutdownCoordinator::new().with_cleanup_timeout(Duration::from_secs(2)));
        coordinator
            .register_cleanup("stuck", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .unwrap();
        record(&coordinator, "after", &trace);
        let trigger = RecordingTrigger::new("t", &trace);

        let report = coordinator.begin_shutdown(trigger.as_ref()).await.unwrap();

        assert_eq!(report.cleanups[0].status, CleanupStatus::TimedOut);
        assert_eq!(report.cleanups[1].status, CleanupStatus::Completed);
    }

    #[tokio::test]
    async fn registration_rules() {
        let trace: Trace = Arc::default();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        coordinator.register_trigger(Arc::new(FailingStart)).unwrap();

        let err = coordinator.start_all().unwrap_err();
        assert!(matches!(err, ShutdownError::TriggerStart { ref name, .. } if name == "failing"));
        assert!(matches!(
            coordinator.register_trigger(RecordingTrigger::new("late", &trace)),
            Err(ShutdownError::AlreadyStarted)
        ));

        let trigger = RecordingTrigger::new("t", &trace);
        coordinator.begin_shutdown(trigger.as_ref()).await.unwrap();
        assert!(matches!(
            coordinator.register_cleanup("late", || async { Ok(()) }),
            Err(ShutdownError::ShutdownInProgress)
        ));
    }

    #[tokio::test]
    async fn subscribers_and_waiters_observe_shutdown() {
        let trace: Trace = Arc::default();
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let mut notified = coordinator.subscribe();
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_for_completion().await })
        };
        assert!(!coordinator.is_shutting_down());

        let trigger = RecordingTrigger::new("t", &trace);
        coordinator.begin_shutdown(trigger.as_ref()).await.unwrap();

        assert!(coordinator.is_shutting_down());
        notified.recv().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
