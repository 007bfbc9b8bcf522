//! # nx-cli
//!
//! Command-line client for the Nexxon runtime.
//!
//! - `nexxon plan|diff|apply|test|search|index|log|whoami|undo|validate`:
//!   send one request envelope to a running runtime and render the reply
//! - `nexxon serve`: run the runtime in the foreground
//! - `nexxon audit verify/tail`: inspect the local audit log directly
//!
//! The exit code reflects the outcome: 0 success, 1 error, 2 policy
//! denied, 3 tests failed, 4 invalid arguments.

mod client;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nx_runtime::RuntimeConfig;

use crate::client::{RuntimeClient, DEFAULT_RUNTIME_URL};

/// Nexxon CLI - drive the coding-agent control plane.
#[derive(Parser)]
#[command(name = "nexxon", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// Base URL of the runtime.
    #[arg(long, global = true, default_value = DEFAULT_RUNTIME_URL)]
    runtime_url: String,

    /// Print the raw response envelope instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Request(commands::request::RequestCommand),
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Run the runtime in the foreground.
    Serve {
        /// Port to listen on (defaults to NEXXON_PORT or 7777).
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);

    match &cli.command {
        Commands::Request(command) => {
            let client = RuntimeClient::new(&cli.runtime_url)?;
            let code = commands::request::execute(command, &client, cli.json)?;
            if code.as_i32() != 0 {
                std::process::exit(code.as_i32());
            }
            Ok(())
        }
        Commands::Audit { command } => {
            let config = RuntimeConfig::for_project(&project_root);
            commands::audit::execute(command, &config)
        }
        Commands::Serve { port } => commands::serve::execute(&project_root, *port),
    }
}
