use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use graph_rpc_driver::config::load_config;
use graph_rpc_driver::health::{HealthTable, ServerProber};
use graph_rpc_driver::observability::{logging, metrics};
use graph_rpc_driver::{Driver, DriverConfig, DriverError, RawDecoder, Request};

#[derive(Parser)]
#[command(name = "graph-rpc-driver")]
#[command(about = "Probe and call graph database servers", long_about = None)]
struct Cli {
    /// Driver configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one health round and print server availability
    Probe,
    /// Send a raw request and print the response body
    Send {
        /// Request body
        #[arg(short, long)]
        body: String,

        /// Call timeout (defaults to request.default_timeout_ms)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match cli.command {
        Commands::Probe => {
            probe(&config).await;
            ExitCode::SUCCESS
        }
        Commands::Send { body, timeout_ms } => match send(config, body, timeout_ms).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn probe(config: &DriverConfig) {
    let table = Arc::new(HealthTable::new(&config.server_addresses()));
    ServerProber::new(table.clone(), &config.health_check).probe_all().await;

    println!("{:<40} {}", "SERVER", "STATUS");
    for (address, available) in table.snapshot() {
        let status = if available { "available" } else { "unavailable" };
        println!("{:<40} {}", address.to_string(), status);
    }
}

async fn send(config: DriverConfig, body: String, timeout_ms: Option<u64>) -> Result<(), DriverError> {
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(config.request.default_timeout_ms));
    let driver = Driver::new(config)?;
    let request = Request::new(body);

    let result = driver.send(&request, RawDecoder, timeout).await;
    driver.close().await;

    match result {
        Ok(body) => {
            println!("request_id: {}", request.request_id());
            println!("status: 200");
            println!("{}", String::from_utf8_lossy(&body));
            Ok(())
        }
        Err(DriverError::Status { code, message, .. }) => {
            println!("request_id: {}", request.request_id());
            println!("status: {}", code);
            println!("{}", message);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
