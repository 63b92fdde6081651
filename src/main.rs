//! cnet-security - Request authentication and rate limiting for HTTP services
//!
//! This is the main entry point for the cnet-security server and its token
//! tooling.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use cnet_security::config::Config;
use cnet_security::context::SecurityContext;
use cnet_security::exchange::HttpMethod;
use cnet_security::models::TokenPermission;
use cnet_security::server::{AppState, Server};
use cnet_security::telemetry::init_tracing;

/// cnet-security - Request authentication and rate limiting for HTTP services
#[derive(Parser, Debug)]
#[command(name = "cnet-security")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CNET_SECURITY_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Mint a token, persist it and print its bearer string once
    GenerateToken {
        /// Path pattern the token may access
        #[arg(long, default_value = "*")]
        path: String,

        /// Domain pattern the token may access
        #[arg(long, default_value = "*")]
        domain: String,

        /// Allowed methods, repeatable (`*` for all)
        #[arg(long = "method", default_value = "*")]
        methods: Vec<HttpMethod>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(&config.logging.level, &config.logging.format)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::GenerateToken {
            path,
            domain,
            methods,
        } => generate_token(&config, &path, &domain, methods),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting cnet-security");

    let context = Arc::new(SecurityContext::from_config(&config)?);

    let sweeper = {
        let context = Arc::clone(&context);
        let period = Duration::from_secs(config.rate_limit.tick_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                match context.tick() {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "Swept expired rate limit counters");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Rate limit sweep failed");
                        break;
                    }
                }
            }
        })
    };

    let server = Server::new(config.server.clone(), AppState::new(Arc::clone(&context)));

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    sweeper.abort();
    if let Err(e) = context.shutdown() {
        error!(error = %e, "Failed to persist tokens on shutdown");
    }

    info!("cnet-security shutdown complete");

    result.map_err(Into::into)
}

fn generate_token(
    config: &Config,
    path: &str,
    domain: &str,
    methods: Vec<HttpMethod>,
) -> anyhow::Result<()> {
    let context = SecurityContext::from_config(config)?;
    let tokens = context.token_manager()?;

    let permission = TokenPermission::new(path, domain, methods)?;
    let (bearer, token) = tokens.generate(vec![permission])?;
    tokens.save()?;

    info!(token_id = token.id(), path = %config.tokens.path, "Token stored");
    println!("{}", bearer);
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
