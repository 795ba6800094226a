//! kontext - follow Kubernetes contexts, their resources and permissions
//!
//! Streams per-context reachability, resource counts and RBAC permissions
//! as JSON lines, one per state change.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kontext::cli::{self, ConfigSubcommand, Settings};
use kontext::config::ConfigLoader;
use std::path::PathBuf;

/// Follow Kubernetes contexts, their resources and permissions
#[derive(Parser, Debug)]
#[command(name = "kontext")]
#[command(about = "Per-context Kubernetes watch, cache and RBAC permission state", long_about = None)]
struct Args {
    /// Enable debug logging to a temporary file
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Kubeconfig file to read instead of the default locations
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Namespace for namespaced watches, overriding each context's own
    #[arg(long, short = 'n', global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Main commands
#[derive(Subcommand, Debug)]
enum Command {
    /// List kubeconfig contexts
    Contexts,
    /// Print the permission of every tracked resource kind in a context
    Permissions {
        /// Context name (defaults to the current context)
        #[arg(long)]
        context: Option<String>,
    },
    /// Track every context and stream state changes as JSON lines
    Watch,
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let command = match args.command {
        Command::Config { subcommand } => return cli::handle_config_command(subcommand).await,
        Command::Version => {
            cli::display_version();
            return Ok(());
        }
        command => command,
    };

    let config = ConfigLoader::load().context("Failed to load configuration")?;

    let log_file = cli::init_logging(args.debug, &config.log_level)?;
    if let Some(ref log_path) = log_file {
        eprintln!(
            "Debug logging enabled. Logs written to: {}",
            log_path.display()
        );
    }

    let settings = Settings::new(config, args.kubeconfig, args.namespace);
    tracing::debug!(
        "Settings: kubeconfig={:?}, namespace={:?}, reconnect every {:?}",
        settings.kubeconfig,
        settings.namespace,
        settings.config.reconnect_interval()
    );

    match command {
        Command::Contexts => cli::handle_contexts_command(&settings).await,
        Command::Permissions { context } => cli::handle_permissions_command(&settings, context).await,
        Command::Watch => cli::handle_watch_command(&settings).await,
        Command::Config { .. } | Command::Version => Ok(()),
    }
}
