//! HTTP server lifecycle.
//!
//! # Responsibilities
//! - Mount the collaborator router plus `/healthz` and `/version`
//! - Wire up middleware (tracing, timeout, request ID)
//! - Run the accept loop on its own task
//! - Verify readiness before reporting a successful start
//! - Drain in-flight connections on close, force-closing them at the deadline
//!
//! # State Machine
//! ```text
//! Created → Starting → Ready → ShuttingDown → Stopped
//!              └──────→ Failed
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::{routing::get, Router};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::{healthz, version, HealthState};
use crate::lifecycle::startup::{ReadinessProbe, StartupError, HEALTHZ_PATH};
use crate::net::Listener;

/// Extra time `close` waits beyond the drain deadline for the accept task to report.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Async predicate consulted by `GET /healthz`.
pub type ReadinessCheck = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Lifecycle state of the HTTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Starting,
    Ready,
    ShuttingDown,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every connection finished before the deadline.
    Graceful,
    /// The deadline fired and outstanding connections were aborted.
    TimedOut,
}

/// Errors surfaced by [`HttpServer::run`] and [`HttpServer::close`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("listener failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("accept task failed: {0}")]
    Task(#[from] JoinError),
    #[error("connections did not drain within {0:?}, forced close")]
    DrainTimeout(Duration),
}

impl ServerError {
    /// True for bind failures and unconfirmed readiness.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            ServerError::Startup(StartupError::Bind { .. } | StartupError::ReadinessTimeout(_))
        )
    }
}

/// The generic HTTP server: owns the listener, the readiness loop and the drain.
pub struct HttpServer {
    config: ServiceConfig,
    routes: Mutex<Option<Router>>,
    readiness: ReadinessCheck,
    state: watch::Sender<LifecycleState>,
    drained: watch::Sender<Option<DrainOutcome>>,
    shutdown: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpServer {
    /// Create a server that will mount `routes` next to its own endpoints.
    pub fn new(config: ServiceConfig, routes: Router) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        let (drained, _) = watch::channel(None);
        Self {
            config,
            routes: Mutex::new(Some(routes)),
            readiness: Arc::new(|| async { true }.boxed()),
            state,
            drained,
            shutdown: CancellationToken::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Gate `/healthz` on an async predicate; `false` answers 503.
    pub fn with_readiness_check<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = bool> + Send + 'static,
    {
        self.readiness = Arc::new(move || check().boxed());
        self
    }

    /// Mount more routes before the server is started.
    pub fn merge_routes(self, routes: Router) -> Self {
        {
            let mut current = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            let merged = current.take().unwrap_or_default().merge(routes);
            *current = Some(merged);
        }
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// The bound address, available once `run` has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Start serving, verify readiness, then block until the accept task ends.
    ///
    /// Returns `Ok(())` after a clean close.
    pub async fn run(&self) -> Result<(), ServerError> {
        let started = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Created {
                *state = LifecycleState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(StartupError::NotRunnable(self.state().as_str()).into());
        }

        let address = self.config.http.address();
        let listener = match Listener::bind(&address, self.config.http.max_connections).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "Failed to bind listener");
                self.fail_startup();
                return Err(StartupError::Bind {
                    address,
                    source: e.into_io(),
                }
                .into());
            }
        };
        let local_addr = listener.local_addr();
        let _ = self.local_addr.set(local_addr);

        let app = self.build_router();
        let serve = tokio::spawn(serve_connections(
            listener,
            app,
            self.shutdown.clone(),
            self.config.lifecycle.drain_timeout(),
        ));
        tracing::info!(address = %local_addr, "Start to listening the incoming requests");

        if self.config.http.healthz {
            let probe = ReadinessProbe::new(local_addr, self.config.lifecycle.probe_interval());
            let verified = probe
                .wait_until_ready(self.config.lifecycle.startup_timeout(), &self.shutdown)
                .await;
            if let Err(e) = verified {
                self.shutdown.cancel();
                // A close() in progress gets its drain; a failed startup tears down at once.
                let terminal = match e {
                    StartupError::Cancelled => LifecycleState::Stopped,
                    _ => {
                        serve.abort();
                        LifecycleState::Failed
                    }
                };
                let outcome = match serve.await {
                    Ok(Ok(outcome)) => outcome,
                    _ => DrainOutcome::Graceful,
                };
                self.drained.send_replace(Some(outcome));
                self.state.send_replace(terminal);
                return Err(e.into());
            }
        }

        self.state.send_if_modified(|state| {
            if *state == LifecycleState::Starting {
                *state = LifecycleState::Ready;
                true
            } else {
                false
            }
        });
        tracing::info!(address = %local_addr, "Server ready");

        let result = match serve.await {
            Ok(Ok(outcome)) => {
                self.drained.send_replace(Some(outcome));
                Ok(())
            }
            Ok(Err(e)) => {
                self.drained.send_replace(Some(DrainOutcome::Graceful));
                Err(ServerError::Accept(e))
            }
            Err(e) => {
                self.drained.send_replace(Some(DrainOutcome::Graceful));
                Err(ServerError::Task(e))
            }
        };

        self.state.send_replace(LifecycleState::Stopped);
        tracing::info!(address = %local_addr, "Server on {} stopped", local_addr);
        result
    }

    /// Stop accepting, drain in-flight requests, and force-close at the deadline.
    ///
    /// A drain timeout is logged and returned, but the listener is closed either way.
    pub async fn close(&self) -> Result<(), ServerError> {
        let previous = self.state.send_replace(LifecycleState::ShuttingDown);
        match previous {
            LifecycleState::Created | LifecycleState::Stopped | LifecycleState::Failed => {
                self.shutdown.cancel();
                self.state.send_replace(match previous {
                    LifecycleState::Failed => LifecycleState::Failed,
                    _ => LifecycleState::Stopped,
                });
                return Ok(());
            }
            LifecycleState::Starting | LifecycleState::Ready | LifecycleState::ShuttingDown => {}
        }

        let drain_timeout = self.config.lifecycle.drain_timeout();
        tracing::info!(drain_timeout = ?drain_timeout, "Shutting down http server");
        self.shutdown.cancel();

        let mut drained = self.drained.subscribe();
        let outcome = time::timeout(drain_timeout + CLOSE_GRACE, async {
            drained.wait_for(Option::is_some).await.map(|outcome| *outcome)
        })
        .await;

        // A startup failure racing this close keeps its Failed state.
        self.state.send_if_modified(|state| {
            if *state == LifecycleState::ShuttingDown {
                *state = LifecycleState::Stopped;
                true
            } else {
                false
            }
        });
        match outcome {
            Ok(Ok(Some(DrainOutcome::TimedOut))) | Err(_) => {
                tracing::warn!(
                    drain_timeout = ?drain_timeout,
                    "Shutdown http server failed: connections did not drain in time"
                );
                Err(ServerError::DrainTimeout(drain_timeout))
            }
            Ok(_) => {
                tracing::info!("Http server closed");
                Ok(())
            }
        }
    }

    /// Publish an empty drain and mark the server failed, before any accept task exists.
    fn fail_startup(&self) {
        self.drained.send_replace(Some(DrainOutcome::Graceful));
        self.state.send_replace(LifecycleState::Failed);
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self) -> Router {
        let routes = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        let mut router = routes.route("/version", get(version));
        if self.config.http.healthz {
            let health = Router::new().route(HEALTHZ_PATH, get(healthz)).with_state(HealthState {
                check: Arc::clone(&self.readiness),
                lifecycle: self.state.subscribe(),
            });
            router = router.merge(health);
        }

        router.layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer())
                .layer(TimeoutLayer::new(self.config.http.request_timeout())),
        )
    }
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("address", &self.config.http.address())
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

/// Accept loop plus drain. Runs on its own task.
async fn serve_connections(
    listener: Listener,
    app: Router,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> std::io::Result<DrainOutcome> {
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr, permit) = match accepted {
            Ok(connection) => connection,
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "Dropped connection during accept");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Listener failed, closing all connections");
                connections.shutdown().await;
                return Err(e.into_io());
            }
        };

        let service = TowerToHyperService::new(app.clone());
        let token = shutdown.clone();
        connections.spawn(async move {
            let _permit = permit;
            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = token.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };
            if let Err(e) = result {
                tracing::debug!(peer_addr = %peer_addr, error = %e, "Connection error");
            }
        });

        // Reap finished connections so the set does not grow unbounded.
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    while connections.try_join_next().is_some() {}
    tracing::info!(
        active_connections = connections.len(),
        drain_timeout = ?drain_timeout,
        "Listener closed, draining connections"
    );

    let drained = time::timeout(drain_timeout, async {
        while connections.join_next().await.is_some() {}
    })
    .await
    .is_ok();

    if drained {
        Ok(DrainOutcome::Graceful)
    } else {
        tracing::warn!(
            remaining = connections.len(),
            "Drain deadline elapsed, forcing connections closed"
        );
        connections.shutdown().await;
        Ok(DrainOutcome::TimedOut)
    }
}
