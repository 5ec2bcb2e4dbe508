//! Public medication operations shared by every transport.
//!
//! [`MedService`] is synchronous; async callers run it on `spawn_blocking`.
//! Every mutating operation takes the same process-wide write lock because they
//! read-modify-write overlapping keys. Readers skip the lock and may see data
//! that is a moment stale.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::db::KvStore;
use crate::meds::adherence::{dose_status, project_next_dose};
use crate::meds::compliance::{self, SetOutcome};
use crate::meds::error::{MedError, MedResult, StorageError};
use crate::meds::recalc::{self, RecalcSummary};
use crate::meds::types::{key_name_of, ComplianceLogEntry, Direction, DoseStatus};
use crate::meds::{directions, DateRange};

/// A direction together with its next projected dose.
#[derive(Debug, Clone, Serialize)]
pub struct MedStatus {
    pub direction: Direction,
    pub projected: ComplianceLogEntry,
    pub status: DoseStatus,
}

pub struct MedService {
    store: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
    api: ApiConfig,
    window_months: u32,
}

impl MedService {
    pub fn new(store: Arc<dyn KvStore>, api: ApiConfig, window_months: u32) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            api,
            window_months: window_months.max(1),
        }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    fn write_guard(&self) -> MedResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()).into())
    }

    pub fn list_directions(&self) -> MedResult<Vec<Direction>> {
        directions::list(self.store())
    }

    pub fn upsert_direction(&self, direction: Direction) -> MedResult<Direction> {
        let _guard = self.write_guard()?;
        directions::upsert(self.store(), direction)
    }

    pub fn delete_direction(&self, name: &str) -> MedResult<Direction> {
        let _guard = self.write_guard()?;
        directions::delete(self.store(), name)
    }

    /// Direction for `name`, matched by key name or full name.
    pub fn direction(&self, name: &str) -> MedResult<Direction> {
        let all = self.list_directions()?;
        directions::resolve(&all, name)
            .cloned()
            .ok_or_else(|| MedError::not_found(format!("medication '{name}'")))
    }

    /// Log entries between `from` and `to` (inclusive days), optionally for one medication.
    ///
    /// `from` defaults to `default_range_days` before `today`, `to` to `today`.
    pub fn compliance_log(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        med: Option<&str>,
        today: NaiveDate,
    ) -> MedResult<Vec<ComplianceLogEntry>> {
        let to = to.unwrap_or(today);
        let from = from.unwrap_or(to - Duration::days(self.api.default_range_days));
        let range = DateRange::new(from, to);
        if range.days() > self.api.max_range_days {
            return Err(MedError::validation(format!(
                "range {range} spans {} days, the maximum is {}",
                range.days(),
                self.api.max_range_days
            )));
        }

        let mut entries = compliance::get(self.store(), &range)?;
        if let Some(med) = med {
            let key = key_name_of(med);
            entries.retain(|e| e.med_keyname == key);
        }
        Ok(entries)
    }

    /// Create, update or undo an entry. `med_keyname` may be a key or a full name.
    pub fn post_compliance_log(
        &self,
        entry: ComplianceLogEntry,
        now: DateTime<Utc>,
    ) -> MedResult<SetOutcome> {
        let _guard = self.write_guard()?;
        let direction = self.direction(&entry.med_keyname)?;
        compliance::set_one(self.store(), &direction, entry, now)
    }

    pub fn project_next_dose(&self, med: &str, now: DateTime<Utc>) -> MedResult<ComplianceLogEntry> {
        let direction = self.direction(med)?;
        let entries = compliance::get(self.store(), &DateRange::around(now, self.window_months))?;
        Ok(project_next_dose(&direction, &entries, now))
    }

    pub fn recalculate(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        now: DateTime<Utc>,
    ) -> MedResult<RecalcSummary> {
        let _guard = self.write_guard()?;
        recalc::recalculate(self.store(), from, to, now)
    }

    /// Projected status for the named medications, or all of them when `meds` is empty.
    pub fn status(&self, meds: &[String], now: DateTime<Utc>) -> MedResult<Vec<MedStatus>> {
        let all = self.list_directions()?;
        let selected: Vec<Direction> = if meds.is_empty() {
            all
        } else {
            meds.iter()
                .map(|m| {
                    directions::resolve(&all, m)
                        .cloned()
                        .ok_or_else(|| MedError::not_found(format!("medication '{m}'")))
                })
                .collect::<MedResult<_>>()?
        };

        let entries = compliance::get(self.store(), &DateRange::around(now, self.window_months))?;
        Ok(selected
            .into_iter()
            .map(|direction| {
                let projected = project_next_dose(&direction, &entries, now);
                let status = dose_status(&direction, &projected);
                MedStatus {
                    direction,
                    projected,
                    status,
                }
            })
            .collect())
    }

    /// Record a dose of `med`. `dose` defaults to the prescribed dosage and `at` to `now`.
    pub fn take(
        &self,
        med: &str,
        dose: Option<i64>,
        at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> MedResult<ComplianceLogEntry> {
        let direction = self.direction(med)?;
        let dose = dose.unwrap_or(direction.dosage);
        if dose <= 0 {
            return Err(MedError::validation("dose must be positive"));
        }
        let entry = ComplianceLogEntry::new(direction.key_name(), at.unwrap_or(now), dose);
        match self.post_compliance_log(entry, now)? {
            SetOutcome::Saved(entry) => Ok(entry),
            other => Err(MedError::validation(format!("unexpected outcome {other:?}"))),
        }
    }

    /// Remove the entry `uuid` of `med` taken around `at` (default `now`).
    pub fn undo(
        &self,
        med: &str,
        uuid: Uuid,
        at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> MedResult<SetOutcome> {
        let entry = ComplianceLogEntry::undo(uuid, med, at.unwrap_or(now));
        self.post_compliance_log(entry, now)
    }
}
