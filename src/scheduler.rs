//! Periodic "doses due" notifications.
//!
//! One task per process. Each tick merges the persisted last-notified map with
//! its own, projects every direction, and sends one batched notification when a
//! non-PRN dose is overdue. A failing tick is logged and the loop carries on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::db::{get_json, set_json, KvStore};
use crate::meds::error::MedResult;
use crate::meds::types::{ComplianceLogEntry, Direction, DirectionFlag};
use crate::notify::{Notification, Notifier};
use crate::service::{MedService, MedStatus};

pub const NOTIFIED_KEY: &str = "health_meds_compliance_notified_meds";

pub type NotifiedMap = BTreeMap<String, DateTime<Utc>>;

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Keys of the directions included in the batch.
    pub due: Vec<String>,
    pub sent: bool,
}

/// Merge `local` into the persisted map, keeping the later time per key, and
/// write the result back.
pub fn merge_notified(store: &dyn KvStore, local: &NotifiedMap) -> MedResult<NotifiedMap> {
    let mut txn = store.begin(true)?;
    let mut merged: NotifiedMap = get_json(txn.as_mut(), NOTIFIED_KEY)?.unwrap_or_default();
    for (key, time) in local {
        let slot = merged.entry(key.clone()).or_insert(*time);
        if *time > *slot {
            *slot = *time;
        }
    }
    set_json(txn.as_mut(), NOTIFIED_KEY, &merged)?;
    txn.commit()?;
    Ok(merged)
}

/// Statuses whose projected dose is overdue and not recently notified.
///
/// A medication with no logged dose is always overdue and is renotified only
/// after `renotify_after`.
pub fn due_candidates<'a>(
    statuses: &'a [MedStatus],
    notified: &NotifiedMap,
    now: DateTime<Utc>,
    renotify_after: Duration,
) -> Vec<&'a MedStatus> {
    statuses
        .iter()
        .filter(|s| {
            let Some(expected) = s.projected.expected else {
                return false;
            };
            let never_taken = s.projected.effective_last_dose.is_none();
            if expected.time >= now && !never_taken {
                return false;
            }
            match notified.get(&s.direction.key_name()) {
                None => true,
                Some(last) => {
                    (!never_taken && *last < expected.time) || *last + renotify_after < now
                }
            }
        })
        .collect()
}

/// Markdown body listing each candidate.
pub fn render_markdown(candidates: &[&MedStatus]) -> String {
    let mut out = String::from("The following doses are due:\n");
    for s in candidates {
        out.push_str("\n---\n");
        out.push_str(&format!(
            "### {} _{}_\n\n",
            s.direction.name, s.direction.direction_shorthand
        ));
        if s.direction.has_flag(DirectionFlag::Prn) {
            out.push_str("available as PRN\n");
            continue;
        }
        if let Some(expected) = s.projected.expected {
            out.push_str(&format!(
                "Expected at: {}\n\n",
                expected.time.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        if let Some(last) = &s.projected.effective_last_dose {
            out.push_str(&format!(
                "Last taken at: {}\n\n",
                last.actual.time.format("%Y-%m-%d %H:%M UTC")
            ));
        }
        match s.projected.dose_offset {
            Some(offset) => out.push_str(&format!("Offset: {offset:.2}\n")),
            None => out.push_str("Offset: n/a\n"),
        }
    }
    out
}

#[derive(Serialize)]
struct CandidateContext<'a> {
    med: &'a Direction,
    dose: &'a ComplianceLogEntry,
}

pub struct Scheduler {
    service: Arc<MedService>,
    notifier: Arc<dyn Notifier>,
    config: SchedulerConfig,
    notified: NotifiedMap,
}

impl Scheduler {
    pub fn new(
        service: Arc<MedService>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            service,
            notifier,
            config,
            notified: NotifiedMap::new(),
        }
    }

    async fn sync_notified(&mut self) -> Result<()> {
        let service = Arc::clone(&self.service);
        let local = self.notified.clone();
        self.notified = tokio::task::spawn_blocking(move || merge_notified(service.store(), &local))
            .await
            .context("notified-map task panicked")?
            .context("failed to merge notified map")?;
        Ok(())
    }

    /// Run one iteration as of `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        self.sync_notified().await?;

        let service = Arc::clone(&self.service);
        let statuses = tokio::task::spawn_blocking(move || service.status(&[], now))
            .await
            .context("status task panicked")?
            .context("failed to project doses")?;

        let renotify_after = Duration::hours(self.config.renotify_hours);
        let candidates = due_candidates(&statuses, &self.notified, now, renotify_after);
        let has_new = candidates
            .iter()
            .any(|s| !s.direction.has_flag(DirectionFlag::Prn));

        let due: Vec<String> = candidates.iter().map(|s| s.direction.key_name()).collect();
        tracing::debug!(directions = statuses.len(), due = ?due, has_new, "scheduler tick");
        if !has_new {
            return Ok(TickReport { due, sent: false });
        }

        let context: Vec<CandidateContext<'_>> = candidates
            .iter()
            .map(|s| CandidateContext {
                med: &s.direction,
                dose: &s.projected,
            })
            .collect();
        let notification = Notification {
            subject: self.config.subject.clone(),
            body: render_markdown(&candidates),
            context: serde_json::to_value(&context).context("failed to encode context")?,
        };

        self.notifier
            .send_notification(&notification)
            .await
            .with_context(|| format!("{} notification failed", self.notifier.name()))?;
        tracing::info!(provider = self.notifier.name(), due = ?due, "sent due-dose notification");

        for key in &due {
            self.notified.insert(key.clone(), now);
        }
        self.sync_notified().await?;
        Ok(TickReport { due, sent: true })
    }

    /// Tick on the configured interval until `shutdown` flips or its sender drops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(StdDuration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.config.interval_secs, "scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::warn!(error = %format!("{e:#}"), "scheduler tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::db;
    use crate::meds::shorthand;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Notification>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send_notification(&self, n: &Notification) -> Result<(), NotifyError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NotifyError::Status {
                    provider: "recording",
                    status: 503,
                    body: "down".into(),
                });
            }
            self.sent.lock().unwrap().push(n.clone());
            Ok(())
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn setup(meds: &[&str]) -> (Arc<MedService>, Arc<Recording>) {
        let store = Arc::new(db::open_memory_store().unwrap());
        let service = Arc::new(MedService::new(store, ApiConfig::default(), 1));
        for m in meds {
            service.upsert_direction(shorthand::parse(m).unwrap()).unwrap();
        }
        (service, Arc::new(Recording::default()))
    }

    fn scheduler(service: &Arc<MedService>, notifier: &Arc<Recording>) -> Scheduler {
        Scheduler::new(
            Arc::clone(service),
            Arc::clone(notifier) as Arc<dyn Notifier>,
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn overdue_dose_is_notified_once_then_after_renotify_window() {
        let (service, notifier) = setup(&["Atorvastatin 10mg qd"]);
        service
            .take("atorvastatin", None, Some(at(1, 8)), at(1, 8))
            .unwrap();
        let mut sched = scheduler(&service, &notifier);

        let report = sched.tick(at(2, 9)).await.unwrap();
        assert!(report.sent);
        assert_eq!(report.due, vec!["atorvastatin"]);

        let report = sched.tick(at(2, 10)).await.unwrap();
        assert!(!report.sent);

        let report = sched.tick(at(2, 14)).await.unwrap();
        assert!(report.sent);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Medications Due");
        assert!(sent[0].body.contains("### Atorvastatin _Atorvastatin 10mg qd_"));
        assert!(sent[0].body.contains("Offset: 0.04"));
    }

    #[tokio::test]
    async fn never_taken_medication_is_due_and_renotified_after_window() {
        let (service, notifier) = setup(&["Atorvastatin 10mg qd"]);
        let mut sched = scheduler(&service, &notifier);

        let report = sched.tick(at(2, 9)).await.unwrap();
        assert!(report.sent);
        assert_eq!(report.due, vec!["atorvastatin"]);
        assert!(notifier.sent.lock().unwrap()[0].body.contains("Offset: n/a"));

        assert!(!sched.tick(at(2, 9) + Duration::minutes(5)).await.unwrap().sent);
        assert!(!sched.tick(at(2, 12)).await.unwrap().sent);
        assert!(sched.tick(at(2, 14)).await.unwrap().sent);
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn prn_alone_does_not_trigger_a_batch() {
        let (service, notifier) = setup(&["Hydroxyzine 50mg q6h prn"]);
        service
            .take("hydroxyzine", None, Some(at(1, 8)), at(1, 8))
            .unwrap();
        let mut sched = scheduler(&service, &notifier);

        let report = sched.tick(at(2, 8)).await.unwrap();
        assert_eq!(report.due, vec!["hydroxyzine"]);
        assert!(!report.sent);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prn_rides_along_with_a_due_dose() {
        let (service, notifier) = setup(&["Atorvastatin 10mg qd", "Hydroxyzine 50mg q6h prn"]);
        service
            .take("atorvastatin", None, Some(at(1, 8)), at(1, 8))
            .unwrap();
        service
            .take("hydroxyzine", None, Some(at(1, 8)), at(1, 8))
            .unwrap();
        let mut sched = scheduler(&service, &notifier);

        let report = sched.tick(at(2, 9)).await.unwrap();
        assert!(report.sent);
        assert_eq!(report.due.len(), 2);
        assert!(notifier.sent.lock().unwrap()[0]
            .body
            .contains("available as PRN"));
    }

    #[tokio::test]
    async fn failed_send_is_retried_next_tick() {
        let (service, notifier) = setup(&["Atorvastatin 10mg qd"]);
        service
            .take("atorvastatin", None, Some(at(1, 8)), at(1, 8))
            .unwrap();
        let mut sched = scheduler(&service, &notifier);

        notifier.fail.store(true, Ordering::SeqCst);
        assert!(sched.tick(at(2, 9)).await.is_err());

        notifier.fail.store(false, Ordering::SeqCst);
        assert!(sched.tick(at(2, 9)).await.unwrap().sent);
    }

    #[tokio::test]
    async fn persisted_map_suppresses_a_fresh_instance() {
        let (service, notifier) = setup(&["Atorvastatin 10mg qd"]);
        service
            .take("atorvastatin", None, Some(at(1, 8)), at(1, 8))
            .unwrap();

        assert!(scheduler(&service, &notifier).tick(at(2, 9)).await.unwrap().sent);
        assert!(!scheduler(&service, &notifier).tick(at(2, 10)).await.unwrap().sent);
    }

    #[test]
    fn merge_keeps_latest_time_per_key() {
        let store = db::open_memory_store().unwrap();
        let mut first = NotifiedMap::new();
        first.insert("a".into(), at(2, 9));
        first.insert("b".into(), at(2, 9));
        merge_notified(&store, &first).unwrap();

        let mut second = NotifiedMap::new();
        second.insert("a".into(), at(1, 9));
        second.insert("c".into(), at(3, 9));
        let merged = merge_notified(&store, &second).unwrap();

        assert_eq!(merged["a"], at(2, 9));
        assert_eq!(merged["b"], at(2, 9));
        assert_eq!(merged["c"], at(3, 9));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (service, notifier) = setup(&[]);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler(&service, &notifier).run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
