//! Process wiring: one server, one coordinator, and the triggers that drive it.
//!
//! # Data Flow
//! ```text
//! AdminTrigger ──┐
//! SignalTrigger ─┴→ ShutdownCoordinator → cleanup "http-server" (HttpServer::close)
//!                          └→ end hooks, signal last (process exit)
//! ```

use std::sync::Arc;

use axum::Router;

use crate::admin::{setup_admin_router, AdminTrigger};
use crate::config::ServiceConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::{CleanupError, ShutdownCoordinator, ShutdownError, SignalTrigger, StartupError};

/// Name of the cleanup callback that closes the HTTP server.
const HTTP_SERVER_CLEANUP: &str = "http-server";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// A server wired to its shutdown coordinator.
pub struct Application {
    server: Arc<HttpServer>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl Application {
    /// Register the triggers and the server's close callback.
    ///
    /// End hooks run in registration order and the signal trigger's end hook
    /// exits the process, so it is registered after every other trigger.
    pub fn new(
        config: ServiceConfig,
        routes: Router,
        signals: SignalTrigger,
    ) -> Result<Self, ShutdownError> {
        let coordinator = Arc::new(
            ShutdownCoordinator::new().with_cleanup_timeout(config.lifecycle.cleanup_timeout()),
        );

        let mut server = HttpServer::new(config.clone(), routes);
        if config.admin.enabled {
            let admin = Arc::new(AdminTrigger::new());
            coordinator.register_trigger(admin.clone())?;
            let routes = setup_admin_router(admin, server.subscribe_state(), &config.admin.api_key);
            server = server.merge_routes(routes);
        }
        coordinator.register_trigger(Arc::new(signals))?;

        let server = Arc::new(server);
        let closing = Arc::clone(&server);
        coordinator.register_cleanup(HTTP_SERVER_CLEANUP, move || {
            let server = Arc::clone(&closing);
            async move { server.close().await.map_err(CleanupError::from) }
        })?;

        Ok(Self {
            server,
            coordinator,
        })
    }

    pub fn server(&self) -> &Arc<HttpServer> {
        &self.server
    }

    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    /// Start the triggers, serve, and return once shutdown has fully finished.
    pub async fn run(&self) -> Result<(), AppError> {
        self.coordinator.start_all()?;

        match self.server.run().await {
            Ok(()) | Err(ServerError::Startup(StartupError::Cancelled)) => {}
            Err(e) => {
                tracing::error!(error = %e, "Server failed");
                return Err(e.into());
            }
        }

        // The end hooks may still be running on the initiating trigger's task.
        if self.coordinator.is_shutting_down() {
            self.coordinator.wait_for_completion().await;
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
