//! Deal Eligibility Daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! deal-eligibility
//!
//! # Start with a config file
//! deal-eligibility --config /etc/evergreen/eligibility.toml
//!
//! # Override the database and bind address
//! deal-eligibility --database-url /data/dealer.sqlite --listen 127.0.0.1:9090
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use deal_eligibility::{db, Config, EligibilityService, HttpServer, SqlDealStore};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "deal-eligibility")]
#[command(about = "Replica eligibility and proposal reporting for the evergreen dealer")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "ELIGIBILITY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "ELIGIBILITY_LISTEN")]
    listen: Option<String>,

    /// Dealer database
    #[arg(long, env = "DEALER_DATABASE_URL")]
    database_url: Option<String>,

    /// Public API base URL shown in sample commands
    #[arg(long, env = "ELIGIBILITY_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("deal_eligibility={}", args.log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    // CLI overrides
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(base) = args.api_base_url {
        config.api_base_url = base;
    }
    config.validate()?;

    let bind_addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.listen))?;

    info!(
        listen = %bind_addr,
        database = %config.database_url,
        default_limit = config.default_limit,
        "Starting deal-eligibility"
    );

    let pool = db::open_pool(
        &config.database_url,
        config.pool_size,
        Duration::from_secs(config.pool_timeout_secs),
    )?;
    let store = Arc::new(SqlDealStore::new(pool));
    let service = Arc::new(EligibilityService::new(store, &config));
    let server = Arc::new(HttpServer::new(service, bind_addr));

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("deal-eligibility stopped");
    Ok(())
}
