//! keyfleet node binary

use clap::{Parser, Subcommand};
use keyfleet::{
    gateway::{create_router, GatewayState},
    transport::UdpTransport,
    Config, Coordinator, LogLevel,
};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keyfleet")]
#[command(about = "Leaderless key ownership over UDP gossip")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the fleet and serve the HTTP API
    Serve {
        /// UDP gossip port (same on every peer)
        #[arg(long)]
        port: Option<u16>,

        /// Bind address for HTTP
        #[arg(long)]
        http: Option<SocketAddr>,

        /// Broadcast addresses (comma-separated)
        #[arg(long, value_delimiter = ',')]
        broadcast: Vec<IpAddr>,

        /// Config file (defaults to ./keyfleet.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn protocol_log_level(level: &str) -> LogLevel {
    match level.to_ascii_lowercase().as_str() {
        "debug" | "trace" => LogLevel::Debug,
        "info" | "warn" | "warning" => LogLevel::Warning,
        _ => LogLevel::Error,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            http,
            broadcast,
            config,
        } => {
            // CLI arguments take priority over file and environment
            let mut config = Config::load(config.as_deref())?;
            if let Some(port) = port {
                config.node.port = port;
            }
            if let Some(http) = http {
                config.http.bind = http;
            }
            if !broadcast.is_empty() {
                config.node.broadcast = broadcast;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.node.log_level.as_str().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let transport = UdpTransport::bind(config.node.port, config.node.broadcast.clone()).await?;
            let coordinator = Coordinator::with_config(transport, config.protocol.clone())?;
            coordinator.set_log_level(protocol_log_level(&config.node.log_level));
            tracing::info!("keyfleet {} node {}", keyfleet::VERSION, coordinator.key());

            let mut manager = {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.manage().await })
            };

            let app = create_router(GatewayState::new(coordinator.clone(), &config.http));
            let listener = tokio::net::TcpListener::bind(config.http.bind).await?;
            tracing::info!("HTTP API listening on {}", config.http.bind);

            let shutdown = {
                let coordinator = coordinator.clone();
                async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for shutdown signal: {}", e);
                    }
                    tracing::info!("Shutting down");
                    coordinator.stop();
                }
            };
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .into_future();

            // a coordinator that stops on its own takes the HTTP API down with it
            tokio::select! {
                served = server => {
                    served?;
                    coordinator.stop();
                    manager.await??;
                }
                managed = &mut manager => {
                    managed??;
                    tracing::warn!("Coordinator stopped, closing HTTP API");
                }
            }
        }
    }

    Ok(())
}
