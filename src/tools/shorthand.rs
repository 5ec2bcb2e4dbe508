//! MCP `parse_shorthand` / `format_shorthand` tool parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ParseShorthandParams {
    #[schemars(
        description = "Prescription shorthand, e.g. 'Metformin 500mg PO bid' or 'Hydroxyzine 50mg qid prn sched(whole)'"
    )]
    pub shorthand: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FormatShorthandParams {
    #[schemars(description = "Medication name")]
    pub name: String,

    #[schemars(description = "Hours between doses (24 = once daily)")]
    pub period_hours: i64,

    #[schemars(description = "Amount per dose")]
    pub dosage: i64,

    #[schemars(description = "Dosage unit, e.g. 'mg'")]
    pub dosage_unit: Option<String>,

    #[schemars(description = "Route, e.g. 'PO'")]
    pub dosage_route: Option<String>,

    #[schemars(description = "Flags: any of 'qam', 'qhs', 'prn', 'ad lib'")]
    pub flags: Option<Vec<String>>,

    #[schemars(description = "Schedule policy: 'default' or 'whole'")]
    pub schedule: Option<String>,
}
