//! Bulk recomputation of stored dose offsets.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

use super::adherence::update_dose_offsets;
use super::compliance;
use super::directions;
use super::error::{MedError, MedResult};
use super::range::{month_key, parse_month, DateRange};
use crate::db::KvStore;

/// First month scanned when no lower bound is given.
pub const DEFAULT_FROM_MONTH: &str = "2000-01";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecalcSummary {
    pub months_scanned: usize,
    pub entries_updated: usize,
}

fn month_arg(value: Option<&str>, default: String) -> MedResult<DateTime<Utc>> {
    let text = value.map(str::to_string).unwrap_or(default);
    parse_month(&text)
        .ok_or_else(|| MedError::validation(format!("invalid month '{text}', expected YYYY-MM")))
}

/// Recompute offsets for every month from `from` to `to` (inclusive, `YYYY-MM`).
///
/// Months are processed oldest first, each against a one-month window on both
/// sides, so a month sees the already recomputed tail of the one before it.
pub fn recalculate(
    store: &dyn KvStore,
    from: Option<&str>,
    to: Option<&str>,
    now: DateTime<Utc>,
) -> MedResult<RecalcSummary> {
    let mut start = month_arg(from, DEFAULT_FROM_MONTH.to_string())?;
    let mut end = month_arg(to, month_key(now))?;
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }

    let directions = directions::list(store)?;
    let mut summary = RecalcSummary::default();
    let mut month = start;

    while month <= end {
        let key = month_key(month);
        let mut entries = compliance::get(store, &DateRange::around(month, 1))?;
        for direction in &directions {
            update_dose_offsets(direction, &mut entries);
        }
        let batch: Vec<_> = entries
            .into_iter()
            .filter(|e| month_key(e.actual.time) == key)
            .collect();

        summary.months_scanned += 1;
        if !batch.is_empty() {
            summary.entries_updated += batch.len();
            tracing::debug!(month = %key, entries = batch.len(), "recalculated month");
            compliance::append(store, batch)?;
        }

        month = match month.checked_add_months(Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    tracing::info!(
        from = %month_key(start),
        to = %month_key(end),
        months = summary.months_scanned,
        entries = summary.entries_updated,
        "recalculation complete"
    );
    Ok(summary)
}
