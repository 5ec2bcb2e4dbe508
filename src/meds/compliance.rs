//! Month-sharded compliance log.
//!
//! Each calendar month (UTC) lives under its own key,
//! `health_meds_compliance_log_YYYY-MM`, as a JSON array sorted newest first.
//! Reads widen the requested window by a month on each side so that offsets for
//! doses near a month boundary see their predecessor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::adherence::{
    dose_offset, find_effective_last_dose, project_next_dose, sort_descending, update_dose_offsets,
};
use super::error::{MedError, MedResult};
use super::range::{month_key, DateRange};
use super::types::{ComplianceLogEntry, Direction};
use crate::db::{get_json, set_json, KvStore, KvTxn};

pub const SHARD_PREFIX: &str = "health_meds_compliance_log_";

/// Result of [`set_one`].
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    Saved(ComplianceLogEntry),
    Deleted,
    /// Undo of a UUID that is not in the log; nothing changed.
    AlreadyAbsent,
}

pub fn shard_key(month: &str) -> String {
    format!("{SHARD_PREFIX}{month}")
}

/// Entries of one month shard. A missing shard is empty.
pub fn read_shard(txn: &mut dyn KvTxn, month: &str) -> MedResult<Vec<ComplianceLogEntry>> {
    Ok(get_json(txn, &shard_key(month))?.unwrap_or_default())
}

/// Sort newest first and persist a month shard. Snapshots are not stored.
pub fn write_shard(
    txn: &mut dyn KvTxn,
    month: &str,
    entries: &mut [ComplianceLogEntry],
) -> MedResult<()> {
    for entry in entries.iter_mut() {
        entry.effective_last_dose = None;
    }
    sort_descending(entries);
    set_json(txn, &shard_key(month), &*entries)?;
    Ok(())
}

/// All entries in the shards overlapping `range` (with slack), newest first.
pub fn read_window(txn: &mut dyn KvTxn, range: &DateRange) -> MedResult<Vec<ComplianceLogEntry>> {
    let mut entries = Vec::new();
    for month in range.shard_keys() {
        entries.extend(read_shard(txn, &month)?);
    }
    sort_descending(&mut entries);
    Ok(entries)
}

/// Read the log for `range` in a read-only transaction.
pub fn get(store: &dyn KvStore, range: &DateRange) -> MedResult<Vec<ComplianceLogEntry>> {
    let mut txn = store.begin(false)?;
    let entries = read_window(txn.as_mut(), range)?;
    txn.discard();
    Ok(entries)
}

/// Month shard within `range` that holds `uuid`, if any.
fn locate(txn: &mut dyn KvTxn, range: &DateRange, uuid: Uuid) -> MedResult<Option<String>> {
    for month in range.shard_keys() {
        if read_shard(txn, &month)?
            .iter()
            .any(|e| e.uuid == Some(uuid))
        {
            return Ok(Some(month));
        }
    }
    Ok(None)
}

/// Remove `uuid` from a shard and persist it, returning the removed entry.
fn remove_from_shard(
    txn: &mut dyn KvTxn,
    month: &str,
    uuid: Uuid,
) -> MedResult<Option<ComplianceLogEntry>> {
    let mut entries = read_shard(txn, month)?;
    let Some(pos) = entries.iter().position(|e| e.uuid == Some(uuid)) else {
        return Ok(None);
    };
    let removed = entries.remove(pos);
    write_shard(txn, month, &mut entries)?;
    Ok(Some(removed))
}

/// Create, update, move or delete a single entry.
///
/// - `actual.dose == 0` is rejected.
/// - A negative dose deletes the entry with that UUID. Deleting an entry that is
///   already gone is a no-op.
/// - A positive dose with a UUID updates that entry, moving it between month
///   shards if its time changed month. An unknown UUID is `NotFound`.
/// - Without a UUID the entry is created, and `expected` is projected if absent.
///
/// Everything happens in one write transaction.
pub fn set_one(
    store: &dyn KvStore,
    direction: &Direction,
    mut entry: ComplianceLogEntry,
    now: DateTime<Utc>,
) -> MedResult<SetOutcome> {
    if entry.actual.dose == 0 {
        return Err(MedError::validation("dose cannot be zero"));
    }
    entry.med_keyname = direction.key_name();

    let mut txn = store.begin(true)?;
    let window = DateRange::around(entry.actual.time, 1);

    if entry.is_undo() {
        let uuid = entry
            .uuid
            .ok_or_else(|| MedError::validation("undo requires the uuid of the entry"))?;
        let Some(month) = locate(txn.as_mut(), &window, uuid)? else {
            tracing::debug!(%uuid, "undo of absent entry");
            return Ok(SetOutcome::AlreadyAbsent);
        };
        remove_from_shard(txn.as_mut(), &month, uuid)?;
        txn.commit()?;
        tracing::info!(%uuid, med = %entry.med_keyname, "compliance entry deleted");
        return Ok(SetOutcome::Deleted);
    }

    match entry.uuid {
        Some(uuid) => {
            let month = locate(txn.as_mut(), &window, uuid)?
                .ok_or_else(|| MedError::not_found(format!("compliance entry {uuid}")))?;
            if let Some(previous) = remove_from_shard(txn.as_mut(), &month, uuid)? {
                entry.created_at = previous.created_at;
                if entry.expected.is_none() {
                    entry.expected = previous.expected;
                }
            }
        }
        None => {
            entry.uuid = Some(Uuid::now_v7());
            entry.created_at = now;
        }
    }
    entry.updated_at = now;

    let context: Vec<ComplianceLogEntry> = read_window(txn.as_mut(), &window)?;
    if entry.expected.is_none() {
        entry.expected = project_next_dose(direction, &context, entry.actual.time).expected;
    }
    let last = find_effective_last_dose(direction, entry.actual.time, &context);
    entry.dose_offset = dose_offset(direction, &entry, last);
    entry.effective_last_dose = None;

    // Later doses of the same key measure against this one now.
    let mut merged = context;
    merged.push(entry.clone());
    update_dose_offsets(direction, &mut merged);
    let offsets: BTreeMap<Uuid, Option<f64>> = merged
        .iter()
        .filter(|e| e.med_keyname == entry.med_keyname)
        .filter_map(|e| e.uuid.map(|u| (u, e.dose_offset)))
        .collect();

    let target = month_key(entry.actual.time);
    let mut shard = read_shard(txn.as_mut(), &target)?;
    shard.push(entry.clone());
    for e in shard.iter_mut().filter(|e| e.actual.time > entry.actual.time) {
        if let Some(offset) = e.uuid.and_then(|u| offsets.get(&u)) {
            e.dose_offset = *offset;
        }
    }
    write_shard(txn.as_mut(), &target, &mut shard)?;
    txn.commit()?;

    tracing::info!(
        uuid = ?entry.uuid,
        med = %entry.med_keyname,
        shard = %target,
        "compliance entry saved"
    );
    Ok(SetOutcome::Saved(entry))
}

/// Merge a batch into the log, grouped by month. The last entry for a UUID wins.
pub fn append(store: &dyn KvStore, batch: Vec<ComplianceLogEntry>) -> MedResult<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut by_month: BTreeMap<String, Vec<ComplianceLogEntry>> = BTreeMap::new();
    for entry in batch {
        by_month
            .entry(month_key(entry.actual.time))
            .or_default()
            .push(entry);
    }

    let mut txn = store.begin(true)?;
    for (month, pending) in by_month {
        let mut entries = read_shard(txn.as_mut(), &month)?;
        for mut entry in pending {
            let uuid = *entry.uuid.get_or_insert_with(Uuid::now_v7);
            match entries.iter_mut().find(|e| e.uuid == Some(uuid)) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        write_shard(txn.as_mut(), &month, &mut entries)?;
        tracing::debug!(shard = %month, entries = entries.len(), "shard appended");
    }
    txn.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, SqliteStore};
    use crate::meds::shorthand;
    use chrono::{NaiveDate, TimeZone};

    fn store() -> SqliteStore {
        db::open_memory_store().unwrap()
    }

    fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, hour, 0, 0).unwrap()
    }

    fn saved(outcome: SetOutcome) -> ComplianceLogEntry {
        match outcome {
            SetOutcome::Saved(entry) => entry,
            other => panic!("expected saved entry, got {other:?}"),
        }
    }

    #[test]
    fn zero_dose_is_rejected() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        let entry = ComplianceLogEntry::new("atorvastatin", at(3, 1, 8), 0);
        let err = set_one(&store, &d, entry, at(3, 1, 8)).unwrap_err();
        assert!(matches!(err, MedError::Validation(_)));
    }

    #[test]
    fn create_assigns_uuid_and_expected() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();

        let first = saved(
            set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 1, 8), 10), at(3, 1, 8)).unwrap(),
        );
        assert!(first.uuid.is_some());
        assert_eq!(first.med_keyname, "atorvastatin");
        assert!(first.dose_offset.is_none());

        let second = saved(
            set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 2, 20), 10), at(3, 2, 20)).unwrap(),
        );
        assert_eq!(second.expected.unwrap().time, at(3, 2, 8));
        assert!((second.dose_offset.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(second.created_at, at(3, 2, 20));
    }

    #[test]
    fn entries_never_persist_snapshots() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 1, 8), 10), at(3, 1, 8)).unwrap();
        set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 2, 8), 10), at(3, 2, 8)).unwrap();

        let mut txn = store.begin(false).unwrap();
        let raw = txn.get(&shard_key("2026-03")).unwrap().unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(!text.contains("effective_last_dose"));
    }

    #[test]
    fn undo_twice_is_a_noop() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        let entry = saved(
            set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 5, 8), 10), at(3, 5, 8)).unwrap(),
        );
        let uuid = entry.uuid.unwrap();

        let undo = ComplianceLogEntry::undo(uuid, "atorvastatin", at(3, 5, 8));
        assert_eq!(
            set_one(&store, &d, undo.clone(), at(3, 5, 9)).unwrap(),
            SetOutcome::Deleted
        );
        let after_first = get(&store, &DateRange::around(at(3, 5, 8), 1)).unwrap();
        assert_eq!(
            set_one(&store, &d, undo, at(3, 5, 9)).unwrap(),
            SetOutcome::AlreadyAbsent
        );
        let after_second = get(&store, &DateRange::around(at(3, 5, 8), 1)).unwrap();
        assert!(after_first.is_empty());
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn undo_without_uuid_is_invalid() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        let entry = ComplianceLogEntry::new("x", at(3, 5, 8), -1);
        assert!(matches!(
            set_one(&store, &d, entry, at(3, 5, 8)),
            Err(MedError::Validation(_))
        ));
    }

    #[test]
    fn update_of_unknown_uuid_is_not_found() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        let mut entry = ComplianceLogEntry::new("x", at(3, 5, 8), 10);
        entry.uuid = Some(Uuid::now_v7());
        assert!(matches!(
            set_one(&store, &d, entry, at(3, 5, 8)),
            Err(MedError::NotFound(_))
        ));
    }

    #[test]
    fn update_moves_entry_between_months() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        let mut entry = saved(
            set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 31, 22), 10), at(3, 31, 22))
                .unwrap(),
        );
        let created = entry.created_at;

        entry.actual.time = at(4, 1, 2);
        let moved = saved(set_one(&store, &d, entry, at(4, 1, 3)).unwrap());
        assert_eq!(moved.created_at, created);
        assert_eq!(moved.updated_at, at(4, 1, 3));

        let mut txn = store.begin(false).unwrap();
        assert!(read_shard(txn.as_mut(), "2026-03").unwrap().is_empty());
        let april = read_shard(txn.as_mut(), "2026-04").unwrap();
        assert_eq!(april.len(), 1);
        assert_eq!(april[0].uuid, moved.uuid);
    }

    #[test]
    fn window_reads_previous_month_tail() {
        let store = store();
        let d = shorthand::parse("Atorvastatin 10mg qd").unwrap();
        set_one(&store, &d, ComplianceLogEntry::new("x", at(3, 31, 22), 10), at(3, 31, 22)).unwrap();

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 20).unwrap(),
        );
        let entries = get(&store, &range).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actual.time, at(3, 31, 22));
    }

    #[test]
    fn append_dedupes_by_uuid_last_wins() {
        let store = store();
        let uuid = Uuid::now_v7();
        let mut a = ComplianceLogEntry::new("metformin", at(3, 3, 8), 500);
        a.uuid = Some(uuid);
        let mut b = a.clone();
        b.dose_offset = Some(0.25);
        let c = ComplianceLogEntry::new("metformin", at(4, 3, 8), 500);

        append(&store, vec![a]).unwrap();
        append(&store, vec![b, c]).unwrap();

        let entries = get(&store, &DateRange::around(at(3, 20, 0), 1)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actual.time, at(4, 3, 8));
        assert!(entries[0].uuid.is_some());
        assert_eq!(entries[1].dose_offset, Some(0.25));
    }
}
