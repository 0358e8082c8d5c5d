//! API server scaffold with a managed lifecycle.
//!
//! # Architecture Overview
//!
//! ```text
//!   main.rs
//!     │  config::load_config → validate
//!     │
//!   app::Application
//!     ├── ShutdownCoordinator ◀── SignalTrigger (SIGINT/SIGTERM)
//!     │        │              ◀── AdminTrigger  (POST /admin/shutdown)
//!     │        │
//!     │        └── cleanup: HttpServer::close (bounded drain)
//!     │
//!     └── HttpServer::run
//!            ├── net::Listener (accept loop task)
//!            ├── api::router + /healthz + /version
//!            └── ReadinessProbe (GET /healthz until 200)
//! ```

pub mod admin;
pub mod api;
pub mod app;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use app::Application;
pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{ShutdownCoordinator, ShutdownTrigger, SignalTrigger};
