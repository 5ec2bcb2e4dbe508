#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use doselog::config::ApiConfig;
use doselog::db::{self, SqliteStore};
use doselog::meds::shorthand;
use doselog::service::MedService;

/// Open a fresh in-memory store with the schema applied.
pub fn test_store() -> Arc<SqliteStore> {
    Arc::new(db::open_memory_store().unwrap())
}

/// A service over a fresh in-memory store, with `meds` saved as directions.
pub fn test_service(meds: &[&str]) -> Arc<MedService> {
    let service = Arc::new(MedService::new(test_store(), ApiConfig::default(), 1));
    for m in meds {
        service
            .upsert_direction(shorthand::parse(m).unwrap())
            .unwrap();
    }
    service
}

/// `2026-month-day hour:00 UTC`.
pub fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, hour, 0, 0).unwrap()
}
