//! Operator commands against the resource and object stores

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use minion::config::Config;
use minion::models::{Identity, ObjectKind, StatusEntry};
use minion::storage::{ObjectStore, ResourceStore, SqliteStore};

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database: {}", config.database.path.display()))
}

pub fn purge(config: &Config, before: Option<i64>) -> Result<()> {
    let store = open_store(config)?;
    let threshold = before.unwrap_or_else(|| Utc::now().timestamp());

    let removed = store.purge_expired(threshold)?;
    println!("Removed {removed} expired {}s", ObjectKind::Creature);
    Ok(())
}

pub fn stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let identities = store.identity_stats()?;
    let egress = store.egress_stats()?;

    println!("Resource Statistics");
    println!("===================");
    println!("  Identities: {}", identities.total);
    println!("    In use: {}", identities.used);
    println!("    Banned: {}", identities.banned);
    println!("  Egress (alive): {}", egress.alive);
    println!("    In use: {}", egress.alive_used);
    println!("  Stored objects: {}", store.count()?);
    Ok(())
}

pub fn reconcile(config: &Config, status: &Path) -> Result<()> {
    let content = std::fs::read_to_string(status)
        .with_context(|| format!("Failed to read status file: {}", status.display()))?;
    let entries: Vec<StatusEntry> =
        serde_json::from_str(&content).context("Failed to parse status snapshot")?;

    let store = open_store(config)?;
    let changed = store.reconcile(&entries)?;
    println!(
        "Reconciled {} assignments ({changed} records changed)",
        entries.len()
    );
    Ok(())
}

pub fn egress_drop_all(config: &Config) -> Result<()> {
    let removed = open_store(config)?.drop_all_egress()?;
    println!("Dropped {removed} egress points");
    Ok(())
}

pub fn egress_remove_dead(config: &Config) -> Result<()> {
    let removed = open_store(config)?.remove_dead_egress()?;
    println!("Removed {removed} dead egress points");
    Ok(())
}

pub fn egress_add(config: &Config, ids: &[i64]) -> Result<()> {
    let store = open_store(config)?;
    let mut added = 0;

    for &id in ids {
        match store.add_egress(id) {
            Ok(()) => added += 1,
            Err(e) if e.is_duplicate() => println!("  Egress {id} already exists, skipping"),
            Err(e) => return Err(e).with_context(|| format!("Failed to add egress {id}")),
        }
    }

    println!("Added {added} egress points");
    Ok(())
}

pub fn identity_add(config: &Config, name: &str, secret: &str, provider: &str) -> Result<()> {
    let identity = Identity::new(name, secret).with_provider(provider);
    open_store(config)?
        .add_identity(&identity)
        .with_context(|| format!("Failed to add identity {name}"))?;

    println!("Added identity {name} ({provider})");
    Ok(())
}

pub fn identity_banned(config: &Config) -> Result<()> {
    let banned = open_store(config)?.banned_identities()?;

    if banned.is_empty() {
        println!("No banned identities");
        return Ok(());
    }

    println!("Banned identities ({}):", banned.len());
    for identity in banned {
        println!("  {} ({})", identity.name, identity.provider);
    }
    Ok(())
}
