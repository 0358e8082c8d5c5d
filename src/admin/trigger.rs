//! Shutdown trigger driven by the admin API.

use std::sync::{Arc, OnceLock, Weak};

use crate::lifecycle::{ShutdownCoordinator, ShutdownTrigger, TriggerError};

/// Diagnostic name of the admin trigger.
pub const NAME: &str = "admin";

/// Result of an admin shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The shutdown sequence was started in the background.
    Started,
    /// Another trigger already owns the sequence.
    AlreadyShuttingDown,
    /// The trigger has not been started, or the coordinator is gone.
    NotStarted,
}

/// Lets an authenticated API call request a graceful shutdown.
#[derive(Debug, Default)]
pub struct AdminTrigger {
    coordinator: OnceLock<Weak<ShutdownCoordinator>>,
}

impl AdminTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the shutdown sequence on a background task and return at once.
    ///
    /// The caller is typically an in-flight HTTP request, which the drain
    /// waits for, so this must never await the sequence itself.
    pub fn fire(self: &Arc<Self>) -> FireOutcome {
        let Some(coordinator) = self.coordinator.get().and_then(Weak::upgrade) else {
            return FireOutcome::NotStarted;
        };
        match coordinator.spawn_shutdown(Arc::clone(self) as Arc<dyn ShutdownTrigger>) {
            Some(_) => FireOutcome::Started,
            None => FireOutcome::AlreadyShuttingDown,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.coordinator
            .get()
            .and_then(Weak::upgrade)
            .is_some_and(|coordinator| coordinator.is_shutting_down())
    }
}

impl ShutdownTrigger for AdminTrigger {
    fn name(&self) -> &str {
        NAME
    }

    fn start(self: Arc<Self>, coordinator: Arc<ShutdownCoordinator>) -> Result<(), TriggerError> {
        self.coordinator
            .set(Arc::downgrade(&coordinator))
            .map_err(|_| TriggerError::Hook("admin trigger started twice".into()))
    }

    fn on_shutdown_begin(&self) -> Result<(), TriggerError> {
        Ok(())
    }

    fn on_shutdown_end(&self) -> Result<(), TriggerError> {
        Ok(())
    }
}
