//! CLI `take`, `undo` and `info` commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::DoselogConfig;
use crate::meds::compliance::SetOutcome;
use crate::service::MedStatus;

fn parse_at(at: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    at.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("invalid time '{s}', expected RFC 3339"))
    })
    .transpose()
}

fn format_offset(offset: Option<f64>) -> String {
    match offset {
        Some(o) => format!("{o:+.2}"),
        None => "n/a".into(),
    }
}

/// Record a dose and print the stored entry.
pub fn take(config: &DoselogConfig, med: &str, dose: Option<i64>, at: Option<&str>) -> Result<()> {
    let service = super::open_service(config)?;
    let entry = service.take(med, dose, parse_at(at)?, Utc::now())?;

    println!("Recorded {} x{}", entry.med_keyname, entry.actual.dose);
    println!("  UUID:      {}", entry.uuid.map(|u| u.to_string()).unwrap_or_default());
    println!("  Taken at:  {}", entry.actual.time.to_rfc3339());
    if let Some(expected) = entry.expected {
        println!("  Expected:  {}", expected.time.to_rfc3339());
    }
    println!("  Offset:    {}", format_offset(entry.dose_offset));
    Ok(())
}

/// Remove a recorded dose.
pub fn undo(config: &DoselogConfig, med: &str, uuid: &str, at: Option<&str>) -> Result<()> {
    let uuid = Uuid::parse_str(uuid).with_context(|| format!("invalid uuid '{uuid}'"))?;
    let service = super::open_service(config)?;
    match service.undo(med, uuid, parse_at(at)?, Utc::now())? {
        SetOutcome::Deleted => println!("Removed {uuid}"),
        SetOutcome::AlreadyAbsent => println!("No entry {uuid} near that time; nothing removed"),
        SetOutcome::Saved(_) => {}
    }
    Ok(())
}

/// Print the projected status of each medication.
pub fn info(config: &DoselogConfig, meds: &[String]) -> Result<()> {
    let service = super::open_service(config)?;
    let statuses = service.status(meds, Utc::now())?;

    if statuses.is_empty() {
        println!("No medications saved. Add one with the HTTP API or the upsert_direction tool.");
        return Ok(());
    }
    for status in &statuses {
        print_status(status);
    }
    Ok(())
}

fn print_status(s: &MedStatus) {
    println!("{} ({})", s.direction.name, s.direction.direction_shorthand);
    println!("  Status:     {}", s.status);
    if let Some(expected) = s.projected.expected {
        println!("  Next dose:  {}", expected.time.to_rfc3339());
    }
    if let Some(last) = &s.projected.effective_last_dose {
        println!("  Last taken: {}", last.actual.time.to_rfc3339());
    }
    println!("  Offset:     {}", format_offset(s.projected.dose_offset));
}
