//! Medication directions, dose logging and adherence.

pub mod adherence;
pub mod compliance;
pub mod directions;
pub mod error;
pub mod range;
pub mod recalc;
pub mod shorthand;
pub mod types;

pub use error::{MedError, MedResult, StorageError};
pub use range::DateRange;
pub use types::{ComplianceLogEntry, Direction, DirectionFlag, DoseInfo, DoseStatus, OptSchedule};
