//! Catalog schema versions.
//!
//! Each step is applied in its own transaction together with its ledger row,
//! so a crash mid-step leaves the catalog at the previous version.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// One numbered schema step.
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "components, descriptions and history",
    sql: include_str!("migrations/001_initial.sql"),
}];

const LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

/// Bring the catalog up to the newest schema version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(LEDGER)
        .context("Failed to create schema ledger")?;

    let applied = applied_versions(conn)?;
    let pending: Vec<_> = STEPS
        .iter()
        .filter(|step| !applied.contains(&step.version))
        .collect();

    if pending.is_empty() {
        tracing::debug!(version = current_version(&applied), "Catalog schema up to date");
        return Ok(());
    }

    for step in pending {
        apply(conn, step)?;
    }
    Ok(())
}

fn applied_versions(conn: &Connection) -> Result<BTreeSet<u32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<u32>>>()?;
    Ok(versions)
}

fn current_version(applied: &BTreeSet<u32>) -> u32 {
    applied.last().copied().unwrap_or(0)
}

fn apply(conn: &Connection, step: &SchemaStep) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .context("Failed to open schema transaction")?;

    tx.execute_batch(step.sql)
        .with_context(|| format!("Schema step {} ({}) failed", step.version, step.name))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        (step.version, step.name, chrono::Utc::now().to_rfc3339()),
    )?;
    tx.commit()?;

    tracing::info!(version = step.version, name = step.name, "Applied catalog schema step");
    Ok(())
}
