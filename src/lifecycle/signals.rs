//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM by default)
//! - Hand the first received signal to the shutdown coordinator
//! - Exit the process once the shutdown sequence has finished
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are installed inside `start`, so install errors are fatal to startup
//! - Exiting is the end hook, which always runs after every cleanup callback

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownTrigger, TriggerError};

/// Diagnostic name of the signal trigger.
pub const NAME: &str = "signal";

/// Signals that can be watched for shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownSignal {
    #[serde(alias = "SIGINT")]
    Interrupt,
    #[serde(alias = "SIGTERM")]
    Terminate,
    #[serde(alias = "SIGHUP")]
    Hangup,
    #[serde(alias = "SIGQUIT")]
    Quit,
    #[serde(alias = "SIGUSR1")]
    User1,
    #[serde(alias = "SIGUSR2")]
    User2,
}

impl ShutdownSignal {
    /// Interrupt and terminate.
    pub fn defaults() -> [ShutdownSignal; 2] {
        [ShutdownSignal::Interrupt, ShutdownSignal::Terminate]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Hangup => "SIGHUP",
            ShutdownSignal::Quit => "SIGQUIT",
            ShutdownSignal::User1 => "SIGUSR1",
            ShutdownSignal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
            ShutdownSignal::Quit => SignalKind::quit(),
            ShutdownSignal::User1 => SignalKind::user_defined1(),
            ShutdownSignal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShutdownSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(&name);
        match name {
            "INT" | "INTERRUPT" => Ok(ShutdownSignal::Interrupt),
            "TERM" | "TERMINATE" => Ok(ShutdownSignal::Terminate),
            "HUP" | "HANGUP" => Ok(ShutdownSignal::Hangup),
            "QUIT" => Ok(ShutdownSignal::Quit),
            "USR1" | "USER1" => Ok(ShutdownSignal::User1),
            "USR2" | "USER2" => Ok(ShutdownSignal::User2),
            _ => Err(format!("unknown signal `{}`", s)),
        }
    }
}

type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

fn exit_process(code: i32) {
    std::process::exit(code)
}

/// Shutdown trigger driven by OS signals.
pub struct SignalTrigger {
    signals: Vec<ShutdownSignal>,
    exit: ExitHook,
}

impl SignalTrigger {
    /// Watch `signals`; an empty set falls back to interrupt and terminate.
    pub fn new(signals: impl IntoIterator<Item = ShutdownSignal>) -> Self {
        let mut watched: Vec<ShutdownSignal> = Vec::new();
        for signal in signals {
            if !watched.contains(&signal) {
                watched.push(signal);
            }
        }
        if watched.is_empty() {
            watched = ShutdownSignal::defaults().to_vec();
        }
        Self {
            signals: watched,
            exit: Arc::new(exit_process),
        }
    }

    /// Replace the process exit performed by the end hook.
    pub fn with_exit_hook(mut self, hook: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit = Arc::new(hook);
        self
    }

    pub fn signals(&self) -> &[ShutdownSignal] {
        &self.signals
    }
}

impl Default for SignalTrigger {
    fn default() -> Self {
        Self::new(ShutdownSignal::defaults())
    }
}

impl fmt::Debug for SignalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTrigger")
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

impl ShutdownTrigger for SignalTrigger {
    fn name(&self) -> &str {
        NAME
    }

    #[cfg(unix)]
    fn start(self: Arc<Self>, coordinator: Arc<ShutdownCoordinator>) -> Result<(), TriggerError> {
        use futures_util::future::select_all;
        use tokio::signal::unix::signal;

        let mut streams = Vec::with_capacity(self.signals.len());
        for &watched in &self.signals {
            let stream = signal(watched.kind())
                .map_err(|source| TriggerError::SignalInstall { signal: watched, source })?;
            streams.push((watched, stream));
        }

        tokio::spawn(async move {
            let received = {
                let waits = streams.iter_mut().map(|(watched, stream)| {
                    let watched = *watched;
                    Box::pin(async move {
                        stream.recv().await;
                        watched
                    })
                });
                select_all(waits).await.0
            };
            tracing::info!(signal = %received, "Shutdown signal received");
            coordinator.begin_shutdown(self.as_ref()).await;
        });
        Ok(())
    }

    #[cfg(not(unix))]
    fn start(self: Arc<Self>, coordinator: Arc<ShutdownCoordinator>) -> Result<(), TriggerError> {
        if !self.signals.contains(&ShutdownSignal::Interrupt) {
            tracing::warn!(signals = ?self.signals, "Only SIGINT is supported on this platform");
        }
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            tracing::info!(signal = %ShutdownSignal::Interrupt, "Shutdown signal received");
            coordinator.begin_shutdown(self.as_ref()).await;
        });
        Ok(())
    }

    fn on_shutdown_begin(&self) -> Result<(), TriggerError> {
        Ok(())
    }

    fn on_shutdown_end(&self) -> Result<(), TriggerError> {
        tracing::info!("Shutdown complete, exiting");
        (self.exit)(0);
        Ok(())
    }
}
