//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::DoselogConfig;
use crate::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &DoselogConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `doselog serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let store = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = store
        .with_connection(db::check_database_health)
        .context("failed to run health check")?;

    println!("doselog Health Report");
    println!("=====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Keys:              {}", report.key_count);
    println!("Log shards:        {}", report.shard_count);
    println!();
    println!("Notifier:          {}", config.notify.provider);
    println!(
        "Scheduler:         {}",
        if config.scheduler.enabled {
            format!("every {}s", config.scheduler.interval_secs)
        } else {
            "disabled".into()
        }
    );
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop the server.");
        println!("  2. Restore from a backup: cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
