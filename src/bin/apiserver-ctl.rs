use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "apiserver-ctl")]
#[command(about = "Management CLI for apiserver", long_about = None)]
struct Cli {
    #[arg(short, long, env = "APISERVER_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Bearer token for the admin routes.
    #[arg(short, long, env = "APISERVER_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the readiness endpoint
    Health,
    /// Show server name and version
    Version,
    /// Show lifecycle state (admin)
    Status,
    /// Request a graceful shutdown (admin)
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/healthz", base)).send().await?,
        Commands::Version => client.get(format!("{}/version", base)).send().await?,
        Commands::Status => {
            client
                .get(format!("{}/admin/status", base))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Shutdown => {
            client
                .post(format!("{}/admin/shutdown", base))
                .headers(headers)
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let body = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if !status.is_success() {
        eprintln!("Error: apiserver returned status {}", status);
        eprintln!("Response: {}", body);
        std::process::exit(1);
    }

    println!("{}", body);
    Ok(())
}
