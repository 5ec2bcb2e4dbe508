//! One-shot terminal commands. Each opens the database, runs, prints and exits.

pub mod doctor;
pub mod dose;
pub mod recalc;
pub mod shorthand;

use std::sync::Arc;

use anyhow::Result;

use crate::config::DoselogConfig;
use crate::service::MedService;

/// Open the configured database and wrap it in a [`MedService`].
pub fn open_service(config: &DoselogConfig) -> Result<MedService> {
    let store = crate::db::open_database(config.resolved_db_path())?;
    Ok(MedService::new(
        Arc::new(store),
        config.api.clone(),
        config.scheduler.window_months,
    ))
}
