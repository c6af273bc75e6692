//! Portico - Entry point
//!
//! This is the main binary for the Portico edge gateway.

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portico::{GatewayConfig, GatewayServer};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("portico {}", portico::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Portico - Edge gateway for internal APIs

USAGE:
    portico [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    PORTICO_LISTEN_ADDR           Gateway bind address (default: 0.0.0.0)
    PORTICO_LISTEN_PORT           Gateway listen port (default: 8080)
    PORTICO_UPSTREAM_TIMEOUT      Upstream timeout in seconds (default: 30)
    PORTICO_DEFAULT_CORS_ORIGIN   Default access-control-allow-origin value
    PORTICO_LOG_LEVEL             Log level (default: info)

EXAMPLES:
    # Run with configuration file
    portico --config /etc/portico/gateway.toml

    # Override the listen port
    PORTICO_LISTEN_PORT=3000 portico --config gateway.toml
"
    );
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portico=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Parse arguments
    let args = Args::parse();

    // Load configuration
    let config = match args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            match GatewayConfig::from_file(&path) {
                Ok(config) => config.with_env_overrides(),
                Err(e) => {
                    error!("Failed to load configuration: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("Using default configuration with environment overrides");
            GatewayConfig::default().with_env_overrides()
        }
    };

    // Validate configuration; routing errors are fatal at startup.
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting Portico gateway v{}", portico::VERSION);
    info!(
        "Listening on {}:{}",
        config.server.listen_addr, config.server.listen_port
    );

    // Create and run server
    let server = match GatewayServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
