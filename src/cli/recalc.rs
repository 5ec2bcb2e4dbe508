//! CLI `recalc` command.

use anyhow::Result;
use chrono::Utc;

use crate::config::DoselogConfig;

/// Recompute stored offsets for a month range.
pub fn recalc(config: &DoselogConfig, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let service = super::open_service(config)?;
    println!("Recalculating dose offsets...");
    let summary = service.recalculate(from, to, Utc::now())?;
    println!(
        "  Scanned {} months, rewrote {} entries.",
        summary.months_scanned, summary.entries_updated
    );
    Ok(())
}
