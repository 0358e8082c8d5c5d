//! Shared utilities for the lifecycle integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apiserver::config::ServiceConfig;
use apiserver::http::{HttpServer, LifecycleState, ServerError};
use apiserver::lifecycle::{ShutdownCoordinator, ShutdownTrigger, TriggerError};
use tokio::task::JoinHandle;

/// Ephemeral port and short budgets so tests finish quickly.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.http.bind_address = "127.0.0.1".into();
    config.http.bind_port = 0;
    config.lifecycle.startup_timeout_secs = 5;
    config.lifecycle.probe_interval_ms = 50;
    config.lifecycle.drain_timeout_secs = 2;
    config.lifecycle.cleanup_timeout_secs = 5;
    config
}

/// Run the server on its own task.
pub fn spawn_server(server: &Arc<HttpServer>) -> JoinHandle<Result<(), ServerError>> {
    let server = Arc::clone(server);
    tokio::spawn(async move { server.run().await })
}

/// Wait for the server to report `Ready` and return the bound address.
pub async fn wait_ready(server: &HttpServer) -> SocketAddr {
    let mut state = server.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == LifecycleState::Ready),
    )
    .await
    .expect("server did not become ready")
    .expect("state channel closed");
    server.local_addr().expect("listener bound")
}

/// Client that never reuses connections, so nothing idles through a drain.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Ordered log of lifecycle events shared between triggers and callbacks.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Trigger that only fires when a test calls `begin_shutdown` with it.
pub struct RecordingTrigger {
    name: String,
    events: Events,
}

impl RecordingTrigger {
    pub fn new(name: &str, events: Events) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            events,
        })
    }
}

impl ShutdownTrigger for RecordingTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(self: Arc<Self>, _coordinator: Arc<ShutdownCoordinator>) -> Result<(), TriggerError> {
        self.events.push(format!("start:{}", self.name));
        Ok(())
    }

    fn on_shutdown_begin(&self) -> Result<(), TriggerError> {
        self.events.push(format!("begin:{}", self.name));
        Ok(())
    }

    fn on_shutdown_end(&self) -> Result<(), TriggerError> {
        self.events.push(format!("end:{}", self.name));
        Ok(())
    }
}
