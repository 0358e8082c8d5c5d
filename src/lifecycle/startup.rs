//! Startup verification.
//!
//! # Responsibilities
//! - Probe the server's own `/healthz` endpoint after the listener is running
//! - Retry on a fixed interval until the shared startup deadline expires
//! - Abort early when shutdown is requested while still probing
//!
//! # Design Decisions
//! - Fail fast: a listener that never answers is a fatal startup error
//! - No backoff: every attempt is independent, only the deadline is shared
//! - Probes target loopback when bound to an unspecified address

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Path of the readiness endpoint.
pub const HEALTHZ_PATH: &str = "/healthz";

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can not ping http server within {0:?}")]
    ReadinessTimeout(Duration),
    #[error("startup cancelled by shutdown")]
    Cancelled,
    #[error("server cannot be started from the {0} state")]
    NotRunnable(&'static str),
}

/// Self-directed liveness probe against the readiness endpoint.
pub struct ReadinessProbe {
    client: Client<HttpConnector, Body>,
    url: String,
    interval: Duration,
}

impl ReadinessProbe {
    /// Build a probe for a listener bound to `addr`.
    pub fn new(addr: SocketAddr, interval: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let target = SocketAddr::new(probe_ip(addr.ip()), addr.port());

        Self {
            client,
            url: format!("http://{}{}", target, HEALTHZ_PATH),
            interval,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe until the endpoint answers 200, the deadline passes, or `cancel` fires.
    pub async fn wait_until_ready(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), StartupError> {
        let deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown requested while waiting for the router");
                    return Err(StartupError::Cancelled);
                }
                _ = time::sleep_until(deadline) => {
                    tracing::error!(url = %self.url, timeout = ?timeout, "Router did not become ready in time");
                    return Err(StartupError::ReadinessTimeout(timeout));
                }
                outcome = self.probe_once() => match outcome {
                    Ok(()) => {
                        tracing::info!(url = %self.url, "The router has been deployed successfully");
                        return Ok(());
                    }
                    Err(reason) => {
                        tracing::info!(
                            url = %self.url,
                            reason = %reason,
                            retry_in = ?self.interval,
                            "Waiting for the router"
                        );
                    }
                },
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown requested while waiting for the router");
                    return Err(StartupError::Cancelled);
                }
                _ = time::sleep_until(deadline) => {
                    tracing::error!(url = %self.url, timeout = ?timeout, "Router did not become ready in time");
                    return Err(StartupError::ReadinessTimeout(timeout));
                }
                _ = time::sleep(self.interval) => {}
            }
        }
    }

    async fn probe_once(&self) -> Result<(), String> {
        let request = Request::builder()
            .method("GET")
            .uri(self.url.as_str())
            .header("user-agent", "apiserver-readiness-probe")
            .body(Body::empty())
            .map_err(|e| format!("invalid probe request: {}", e))?;

        match self.client.request(request).await {
            Ok(response) if response.status() == StatusCode::OK => Ok(()),
            Ok(response) => Err(format!("status {}", response.status())),
            Err(e) => Err(format!("connection error: {}", e)),
        }
    }
}

fn probe_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_bind_is_probed_on_loopback() {
        let probe = ReadinessProbe::new("0.0.0.0:8080".parse().unwrap(), Duration::from_secs(1));
        assert_eq!(probe.url(), "http://127.0.0.1:8080/healthz");

        let probe = ReadinessProbe::new("[::]:9000".parse().unwrap(), Duration::from_secs(1));
        assert_eq!(probe.url(), "http://[::1]:9000/healthz");

        let probe = ReadinessProbe::new("10.1.2.3:80".parse().unwrap(), Duration::from_secs(1));
        assert_eq!(probe.url(), "http://10.1.2.3:80/healthz");
    }

    #[tokio::test]
    async fn cancelled_token_stops_probing_immediately() {
        // Nothing listens on this port; the probe would otherwise retry until the deadline.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ReadinessProbe::new(addr, Duration::from_millis(50));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = std::time::Instant::now();
        let result = probe.wait_until_ready(Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(StartupError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unreachable_listener_times_out_at_deadline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ReadinessProbe::new(addr, Duration::from_millis(100));
        let started = std::time::Instant::now();
        let result = probe
            .wait_until_ready(Duration::from_millis(500), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(StartupError::ReadinessTimeout(_))));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(450), "returned too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "returned too late: {:?}", elapsed);
    }
}
