//! warden-daemon: access-control management daemon.
//!
//! Boot sequence: parse CLI arguments, load the TOML configuration, install
//! the tracing subscriber, open (and if necessary initialize) the store,
//! seed the default admin on first start, then run the control-plane server
//! until ctrl-c.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use warden_core::{Db, WardenConfig};
use warden_daemon::{server, Dispatcher, DispatcherConfig};

#[derive(Debug, Parser)]
#[command(name = "warden-daemon", version, about = "Warden access-control daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the configured database path.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => WardenConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => WardenConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(db) = args.db {
        config.database = db;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Db::open(&config.database)
        .with_context(|| format!("failed to open store at {}", config.database.display()))?;
    if let Some(admin_id) = db.ensure_default_admin(&config.default_admin_password)? {
        warn!(admin_id, "seeded default admin account; change its password");
    }

    let dispatcher = Dispatcher::new(
        Arc::new(db),
        DispatcherConfig {
            token_ttl_hours: config.token_ttl_hours,
        },
    );

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(listen = %config.listen, "warden daemon listening");

    tokio::select! {
        result = server::serve(listener, dispatcher) => {
            result.context("server loop failed")?;
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        },
    }
    Ok(())
}
