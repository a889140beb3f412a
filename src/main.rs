mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use minion::config::Config;

#[derive(Parser)]
#[command(
    name = "minion",
    version,
    about = "Rate-limited scan session pool and geolocated object cache",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to MINION_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan server
    Serve {
        /// Listen address override
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Remove expired creatures from the object store
    Purge {
        /// Unix timestamp threshold (defaults to now)
        #[arg(long)]
        before: Option<i64>,
    },

    /// Show identity and egress counts
    Stats,

    /// Set in-use flags from a status snapshot
    Reconcile {
        /// JSON list of {accountName, proxyId} as served by GET /s
        #[arg(long)]
        status: PathBuf,
    },

    /// Manage egress points
    Egress {
        #[command(subcommand)]
        action: EgressAction,
    },

    /// Manage identities
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
}

#[derive(Subcommand)]
enum EgressAction {
    /// Delete every egress point
    DropAll,
    /// Delete egress points marked dead
    RemoveDead,
    /// Register egress points by id
    Add {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Register an identity
    Add {
        name: String,
        secret: String,
        /// Authentication provider
        #[arg(long, default_value = "ptc")]
        provider: String,
    },
    /// List banned identities
    Banned,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    // Initialize tracing/logging
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Serve { listen } => {
            tracing::info!(listen = ?listen, "Starting serve command");
            commands::serve(config, listen).await?;
        }

        Commands::Purge { before } => commands::purge(&config, before)?,

        Commands::Stats => commands::stats(&config)?,

        Commands::Reconcile { status } => {
            tracing::info!(status = %status.display(), "Starting reconcile command");
            commands::reconcile(&config, &status)?;
        }

        Commands::Egress { action } => match action {
            EgressAction::DropAll => commands::egress_drop_all(&config)?,
            EgressAction::RemoveDead => commands::egress_remove_dead(&config)?,
            EgressAction::Add { ids } => commands::egress_add(&config, &ids)?,
        },

        Commands::Identity { action } => match action {
            IdentityAction::Add {
                name,
                secret,
                provider,
            } => commands::identity_add(&config, &name, &secret, &provider)?,
            IdentityAction::Banned => commands::identity_banned(&config)?,
        },
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("minion=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("minion={level},warn"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
