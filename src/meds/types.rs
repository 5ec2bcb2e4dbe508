//! Core record definitions.
//!
//! Defines [`Direction`] (a standing prescription rule), its [`DirectionFlag`]s and
//! [`OptSchedule`] policy, and [`ComplianceLogEntry`] (one recorded dosing event).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MedError, MedResult};

/// Shown next to parsed or formatted directions.
pub const DIRECTION_DISCLAIMER: &str = "For personal use only. No warranty of accuracy.";

/// Modifiers on a direction.
///
/// `Am`/`Hs` only describe when a once-daily dose is taken. `Prn`/`AdLib` change how
/// offsets are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DirectionFlag {
    /// Every morning.
    #[serde(rename = "qam")]
    Am,
    /// At bedtime.
    #[serde(rename = "qhs")]
    Hs,
    /// As needed: never late.
    #[serde(rename = "prn")]
    Prn,
    /// Freely available: never early.
    #[serde(rename = "ad lib")]
    AdLib,
}

impl DirectionFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Am => "qam",
            Self::Hs => "qhs",
            Self::Prn => "prn",
            Self::AdLib => "ad lib",
        }
    }
}

impl std::str::FromStr for DirectionFlag {
    type Err = MedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qam" | "am" => Ok(Self::Am),
            "qhs" | "hs" => Ok(Self::Hs),
            "prn" => Ok(Self::Prn),
            "ad lib" | "adlib" | "ad_lib" => Ok(Self::AdLib),
            _ => Err(MedError::parse(s, "unknown flag")),
        }
    }
}

impl std::fmt::Display for DirectionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the effective last dose is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptSchedule {
    /// Prior partial doses accumulate until one full dose is reached.
    #[default]
    Default,
    /// The most recent prior dose always counts as a whole dose.
    #[serde(rename = "whole")]
    WholeDose,
}

impl std::str::FromStr for OptSchedule {
    type Err = MedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "whole" => Ok(Self::WholeDose),
            _ => Err(MedError::parse(s, "unknown schedule")),
        }
    }
}

/// A standing prescription rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub name: String,
    pub period_hours: i64,
    pub dosage: i64,
    #[serde(default)]
    pub dosage_unit: String,
    #[serde(default)]
    pub dosage_route: String,
    #[serde(default)]
    pub flags: BTreeSet<DirectionFlag>,
    /// Canonical rendering, refreshed whenever the direction list is persisted.
    #[serde(default, rename = "shorthand")]
    pub direction_shorthand: String,
    #[serde(default, rename = "schedule")]
    pub opt_schedule: OptSchedule,
}

/// Longest accepted dosing period: ten years.
pub const MAX_PERIOD_HOURS: i64 = 24 * 365 * 10;

impl Direction {
    /// Lowercased first word of the name. Joins directions to their log entries.
    pub fn key_name(&self) -> String {
        key_name_of(&self.name)
    }

    pub fn has_flag(&self, flag: DirectionFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Check the record-level invariants.
    pub fn validate(&self) -> MedResult<()> {
        if self.name.trim().is_empty() {
            return Err(MedError::validation("name cannot be empty"));
        }
        if self.dosage <= 0 {
            return Err(MedError::validation("dosage must be positive"));
        }
        if self.period_hours <= 0 {
            return Err(MedError::validation("period must be positive"));
        }
        if self.period_hours > MAX_PERIOD_HOURS {
            return Err(MedError::validation(format!(
                "period of {}h exceeds the maximum of {MAX_PERIOD_HOURS}h",
                self.period_hours
            )));
        }
        let am = self.has_flag(DirectionFlag::Am);
        let hs = self.has_flag(DirectionFlag::Hs);
        if am && hs {
            return Err(MedError::validation("'qam' and 'qhs' cannot be used together"));
        }
        if (am || hs) && self.period_hours != 24 {
            return Err(MedError::validation(
                "'qam' and 'qhs' only apply to a 24 hour period",
            ));
        }
        if self.has_flag(DirectionFlag::Prn) && self.has_flag(DirectionFlag::AdLib) {
            return Err(MedError::validation("cannot use 'ad lib' and 'prn' together"));
        }
        Ok(())
    }
}

/// `KeyName` derivation shared by directions and lookups.
pub fn key_name_of(name: &str) -> String {
    name.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// A point in time paired with an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseInfo {
    pub time: DateTime<Utc>,
    pub dose: i64,
}

/// One recorded dosing event, or an undo marker when `actual.dose < 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceLogEntry {
    /// Assigned on creation; `None` on input means "create".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub med_keyname: String,
    /// What the schedule predicted. Filled from a projection when absent.
    #[serde(default)]
    pub expected: Option<DoseInfo>,
    pub actual: DoseInfo,
    /// Periods late (positive) or early (negative); `None` when there is no prior dose.
    #[serde(default)]
    pub dose_offset: Option<f64>,
    /// Snapshot of the entry the offset was measured from. Never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_last_dose: Option<Box<ComplianceLogEntry>>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl ComplianceLogEntry {
    /// A fresh entry for `key` taken at `time`.
    pub fn new(key: impl Into<String>, time: DateTime<Utc>, dose: i64) -> Self {
        Self {
            uuid: None,
            med_keyname: key.into(),
            expected: None,
            actual: DoseInfo { time, dose },
            dose_offset: None,
            effective_last_dose: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// An undo marker for the entry with `uuid`.
    pub fn undo(uuid: Uuid, key: impl Into<String>, time: DateTime<Utc>) -> Self {
        let mut entry = Self::new(key, time, -1);
        entry.uuid = Some(uuid);
        entry
    }

    pub fn is_undo(&self) -> bool {
        self.actual.dose < 0
    }

    /// Copy without the nested snapshot, suitable for nesting inside another entry.
    pub fn snapshot(&self) -> Self {
        Self {
            effective_last_dose: None,
            ..self.clone()
        }
    }
}

/// Where a direction stands relative to its next projected dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Due,
    Available,
    Scheduled,
    Unknown,
}

impl DoseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Due => "DUE",
            Self::Available => "available",
            Self::Scheduled => "scheduled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
