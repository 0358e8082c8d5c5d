//! apiserver entry point.
//!
//! Loads configuration, installs logging, then hands over to
//! [`Application`] and blocks until shutdown has finished.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use apiserver::config::{load_config, validate_config, ConfigError, LogFormat, ServiceConfig};
use apiserver::lifecycle::SignalTrigger;
use apiserver::{api, observability, Application};

#[derive(Parser, Debug)]
#[command(name = "apiserver")]
#[command(version, about = "API server with graceful startup and shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "APISERVER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "APISERVER_BIND_ADDRESS")]
    bind_address: Option<String>,

    #[arg(long, env = "APISERVER_BIND_PORT")]
    bind_port: Option<u16>,

    /// Install /healthz and verify it during startup.
    #[arg(long, env = "APISERVER_HEALTHZ")]
    healthz: Option<bool>,

    #[arg(long, env = "APISERVER_LOG_LEVEL")]
    log_level: Option<String>,

    /// pretty or json.
    #[arg(long, env = "APISERVER_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(address) = &self.bind_address {
            config.http.bind_address = address.clone();
        }
        if let Some(port) = self.bind_port {
            config.http.bind_port = port;
        }
        if let Some(healthz) = self.healthz {
            config.http.healthz = healthz;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, source) = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    observability::init_logging(&config.observability)?;
    source.log();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.http.address(),
        healthz = config.http.healthz,
        admin = config.admin.enabled,
        "apiserver starting"
    );

    let signals = SignalTrigger::new(config.lifecycle.signals.iter().copied());
    let app = Application::new(config, api::router(), signals)?;
    app.run().await?;
    Ok(())
}
