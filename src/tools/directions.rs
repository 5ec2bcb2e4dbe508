//! MCP direction-list tool parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListDirectionsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertDirectionParams {
    /// Replaces any direction with the same key name (first word, lowercased).
    #[schemars(
        description = "Prescription shorthand for the direction to save, e.g. 'Atorvastatin 10mg PO qHS'. Replaces an existing direction with the same first word."
    )]
    pub shorthand: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteDirectionParams {
    #[schemars(description = "Medication key name (first word of the name, case-insensitive)")]
    pub name: String,
}
