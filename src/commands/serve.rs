use std::sync::Arc;

use anyhow::{Context, Result};

use minion::config::Config;
use minion::remote::GatewayFactory;
use minion::server::MinionServer;
use minion::storage::SqliteStore;

/// Run the scan server until Ctrl+C
pub async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.server.listen_addr = listen.parse().context("Invalid listen address")?;
    }

    if let Err(e) = minion::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let store = Arc::new(
        SqliteStore::open(&config.database.path).with_context(|| {
            format!("Failed to open database: {}", config.database.path.display())
        })?,
    );
    let factory = Arc::new(GatewayFactory::from_config(&config.remote));

    println!("Starting Minion Server");
    println!("======================");
    println!("  Listen: {}", config.server.listen_addr);
    println!("  Database: {}", config.database.path.display());
    println!("  Gateway: {}", config.remote.gateway_url);
    println!("  Scan delay: {}s", config.pool.scan_delay_secs);
    println!("  Rate: {} req/s", config.scan.ticks_per_second);
    println!(
        "  Status endpoints: {}",
        if config.server.secret.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();
    println!("API Endpoints:");
    println!("  POST /q           - Scan around lat/lng");
    println!("  POST /c           - Cached objects around lat/lng");
    println!("  GET  /s           - Session assignments (secret)");
    println!("  GET  /stats       - Resource counts (secret)");
    println!("  GET  /api/health  - Health check");
    println!("  GET  /metrics     - Prometheus metrics endpoint");
    println!();
    println!("Press Ctrl+C to stop.\n");

    let server = MinionServer::new(config, store.clone(), store, factory)
        .context("Failed to create minion server")?;

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("Minion server stopped.");
    Ok(())
}
