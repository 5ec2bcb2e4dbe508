pub mod kv;
pub mod schema;

pub use kv::{get_json, set_json, KvStore, KvTxn, SqliteStore};

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Key prefix shared by every compliance log shard.
const SHARD_LIKE: &str = "health_meds_compliance_log_%";

/// Open (or create) the doselog database at the given path with the schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<SqliteStore> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(SqliteStore::new(conn))
}

/// Open an in-memory store. Used by tests and dry runs.
pub fn open_memory_store() -> Result<SqliteStore> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    Ok(SqliteStore::new(conn))
}

/// Result of [`check_database_health`].
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub schema_version: u32,
    pub key_count: i64,
    pub shard_count: i64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Gather schema version, key counts and `PRAGMA integrity_check`.
pub fn check_database_health(conn: &Connection) -> rusqlite::Result<HealthReport> {
    let schema_version = schema::get_schema_version(conn)?;
    let key_count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |r| r.get(0))?;
    let shard_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM kv WHERE key LIKE ?1",
        [SHARD_LIKE],
        |r| r.get(0),
    )?;
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;

    Ok(HealthReport {
        schema_version,
        key_count,
        shard_count,
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
    })
}
