//! MCP compliance-log tool parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetComplianceLogParams {
    #[schemars(description = "First day, YYYY-MM-DD. Defaults to 30 days before 'to'.")]
    pub from: Option<String>,

    #[schemars(description = "Last day, YYYY-MM-DD. Defaults to today.")]
    pub to: Option<String>,

    #[schemars(description = "Only return entries for this medication")]
    pub med: Option<String>,
}

/// Without `uuid` a new dose is recorded; with `uuid` and a positive dose the entry
/// is updated; with `uuid` and a negative dose it is removed.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PostComplianceLogParams {
    #[schemars(description = "Medication key name or full name")]
    pub med: String,

    #[schemars(
        description = "Amount taken. Defaults to the prescribed dosage for new entries. Negative removes the entry given by 'uuid'."
    )]
    pub dose: Option<i64>,

    #[schemars(description = "When the dose was taken, RFC 3339. Defaults to now.")]
    pub time: Option<String>,

    #[schemars(description = "UUID of an existing entry to update or remove")]
    pub uuid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProjectNextDoseParams {
    #[schemars(description = "Medication key name or full name")]
    pub med: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecalculateParams {
    #[schemars(description = "First month, YYYY-MM. Defaults to 2000-01.")]
    pub from: Option<String>,

    #[schemars(description = "Last month, YYYY-MM. Defaults to the current month.")]
    pub to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MedicationStatusParams {
    #[schemars(description = "Medications to report on. Defaults to all.")]
    pub meds: Option<Vec<String>>,
}
