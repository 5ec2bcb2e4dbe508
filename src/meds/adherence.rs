//! Dose-offset computation and next-dose projection.
//!
//! All functions are pure. Entry slices are expected newest first (descending
//! `actual.time`), which is the order the compliance store returns.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::types::{ComplianceLogEntry, Direction, DirectionFlag, DoseInfo, DoseStatus, OptSchedule};

/// Sort newest first.
pub fn sort_descending(entries: &mut [ComplianceLogEntry]) {
    entries.sort_by(|a, b| b.actual.time.cmp(&a.actual.time));
}

/// `None` when the period does not fit a `Duration`.
fn period(direction: &Direction) -> Option<Duration> {
    Duration::try_hours(direction.period_hours)
}

/// Pick the prior entry that counts as "the last dose" for an event at `at`.
///
/// `WholeDose` takes the most recent prior entry. `Default` sums prior doses
/// newest to oldest and stops at the entry where the sum reaches the prescribed
/// dosage; if it never does, the oldest entry examined is used.
pub fn find_effective_last_dose<'a>(
    direction: &Direction,
    at: DateTime<Utc>,
    entries: &'a [ComplianceLogEntry],
) -> Option<&'a ComplianceLogEntry> {
    let key = direction.key_name();
    let mut candidate = None;
    let mut cumulative = 0i64;

    for entry in entries
        .iter()
        .filter(|e| e.med_keyname == key && e.actual.time < at)
    {
        if direction.opt_schedule == OptSchedule::WholeDose {
            return Some(entry);
        }
        cumulative += entry.actual.dose;
        candidate = Some(entry);
        if cumulative >= direction.dosage {
            break;
        }
    }
    candidate
}

/// Periods between `this` and `last`, minus one. `None` without a last dose.
///
/// PRN directions are never late and ad lib directions are never early.
pub fn dose_offset(
    direction: &Direction,
    this: &ComplianceLogEntry,
    last: Option<&ComplianceLogEntry>,
) -> Option<f64> {
    let last = last?;
    let elapsed = (this.actual.time - last.actual.time).num_milliseconds() as f64;
    let period_ms = period(direction)?.num_milliseconds() as f64;
    let offset = elapsed / period_ms - 1.0;

    if direction.has_flag(DirectionFlag::Prn) && offset > 0.0 {
        return Some(0.0);
    }
    if direction.has_flag(DirectionFlag::AdLib) && offset < 0.0 {
        return Some(0.0);
    }
    Some(offset)
}

/// Build the synthetic entry for the next dose as of `now`.
///
/// With a prior dose, `expected.time` is that dose plus one period and the
/// snapshot is attached. Without one, the dose is expected `now` and the offset is
/// undefined.
pub fn project_next_dose(
    direction: &Direction,
    entries: &[ComplianceLogEntry],
    now: DateTime<Utc>,
) -> ComplianceLogEntry {
    let mut next = ComplianceLogEntry {
        uuid: Some(Uuid::now_v7()),
        med_keyname: direction.key_name(),
        expected: Some(DoseInfo {
            time: now,
            dose: direction.dosage,
        }),
        actual: DoseInfo {
            time: now,
            dose: direction.dosage,
        },
        dose_offset: None,
        effective_last_dose: None,
        created_at: now,
        updated_at: now,
    };

    let Some(last) = find_effective_last_dose(direction, now, entries) else {
        return next;
    };

    if let Some(time) = period(direction).and_then(|p| last.actual.time.checked_add_signed(p)) {
        next.expected = Some(DoseInfo {
            time,
            dose: direction.dosage,
        });
    }
    next.dose_offset = dose_offset(direction, &next, Some(last));
    next.effective_last_dose = Some(Box::new(last.snapshot()));
    next
}

/// Recompute `dose_offset` for every entry of `direction` in `entries`.
///
/// Sorts `entries` newest first.
pub fn update_dose_offsets(direction: &Direction, entries: &mut [ComplianceLogEntry]) {
    sort_descending(entries);
    let key = direction.key_name();

    let offsets: Vec<Option<Option<f64>>> = entries
        .iter()
        .map(|entry| {
            (entry.med_keyname == key).then(|| {
                let last = find_effective_last_dose(direction, entry.actual.time, entries);
                dose_offset(direction, entry, last)
            })
        })
        .collect();

    for (entry, offset) in entries.iter_mut().zip(offsets) {
        if let Some(offset) = offset {
            entry.dose_offset = offset;
        }
    }
}

/// Classify a projected dose.
pub fn dose_status(direction: &Direction, projected: &ComplianceLogEntry) -> DoseStatus {
    match projected.dose_offset {
        Some(offset) if direction.has_flag(DirectionFlag::Prn) && offset >= 0.0 => {
            DoseStatus::Available
        }
        Some(offset) if offset > 0.0 => DoseStatus::Due,
        _ if direction.has_flag(DirectionFlag::AdLib) => DoseStatus::Available,
        Some(offset) if offset < 0.0 => DoseStatus::Scheduled,
        _ => DoseStatus::Unknown,
    }
}
