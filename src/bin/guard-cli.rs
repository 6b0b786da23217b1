use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use service_guard::config::{ClientConfig, RetryConfig};
use service_guard::resilience::{ClientError, RequestDescriptor, ResilientClient};
use service_guard::transport::ReqwestTransport;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Query a running service-guard admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key, if the server requires one
    #[arg(short, long, env = "GUARD_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Show the aggregate health summary
    Health {
        /// Run a fresh probe cycle instead of returning the cached summary
        #[arg(long)]
        refresh: bool,
    },
    /// Show one dependency's history and uptime
    Service {
        name: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show per-target client statistics
    Client,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ClientConfig {
        name: "guard-cli".to_string(),
        base_url: Some(cli.url.clone()),
        timeout_ms: 10_000,
        retry: RetryConfig {
            max_attempts: 1,
            base_delay_ms: 250,
            ..RetryConfig::default()
        },
        ..ClientConfig::default()
    };
    let client = ResilientClient::new(config, Arc::new(ReqwestTransport::new()));

    let path = match &cli.command {
        Commands::Status => "/status".to_string(),
        Commands::Health { refresh: true } => "/health?refresh=true".to_string(),
        Commands::Health { refresh: false } => "/health".to_string(),
        Commands::Service { name, limit: Some(n) } => format!("/health/{name}?limit={n}"),
        Commands::Service { name, limit: None } => format!("/health/{name}"),
        Commands::Client => "/client".to_string(),
    };

    let mut request = RequestDescriptor::get(path);
    if let Some(key) = &cli.key {
        request = request.with_header("authorization", format!("Bearer {key}"));
    }

    match client.execute(request).await {
        Ok(response) => {
            print_json(&response.data)?;
            Ok(ExitCode::SUCCESS)
        }
        // An unhealthy summary is still a summary
        Err(ClientError::Api(e)) if e.status_code == Some(503) && e.details.is_some() => {
            print_json(e.details.as_ref().unwrap_or(&Value::Null))?;
            Ok(ExitCode::from(1))
        }
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            eprintln!("Details: {e}");
            Ok(ExitCode::from(2))
        }
    }
}

fn print_json(value: &Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
