//! # nx-daemon
//!
//! The Nexxon runtime as a local HTTP service.
//!
//! Loads `policy.yaml` and `.nexxon/config.toml` from the project root,
//! starts a session in the ledger, and serves request envelopes on
//! `127.0.0.1:<port>` until Ctrl+C or SIGTERM, then ends the session.
//!
//! ## Usage
//!
//! ```text
//! nexxon-daemon --project-root . --port 7777
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nx_runtime::{serve, shutdown_signal, RuntimeConfig, RuntimeContext};

/// Nexxon control-plane runtime.
#[derive(Parser)]
#[command(name = "nexxon-daemon", about = "Nexxon control-plane runtime")]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Port to listen on. Overrides NEXXON_PORT and config.toml.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("nx_runtime=info".parse()?)
                .add_directive("nx_daemon=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli
        .project_root
        .canonicalize()
        .with_context(|| format!("project root {} not found", cli.project_root.display()))?;

    tracing::info!("Starting Nexxon runtime");
    tracing::info!("Project root: {}", project_root.display());

    let mut config = RuntimeConfig::load(&project_root)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));

    let ctx = Arc::new(RuntimeContext::open(config)?);
    let session = ctx.start()?;
    tracing::info!(session = %session, "session started");

    let result = serve(ctx.clone(), addr, shutdown_signal()).await;

    if let Err(e) = ctx.shutdown() {
        tracing::warn!(error = %e, "failed to end session");
    } else {
        tracing::info!(session = %session, "session ended");
    }
    result?;
    Ok(())
}
