pub mod compliance;
pub mod directions;
pub mod shorthand;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use compliance::{
    GetComplianceLogParams, MedicationStatusParams, PostComplianceLogParams,
    ProjectNextDoseParams, RecalculateParams,
};
use directions::{DeleteDirectionParams, ListDirectionsParams, UpsertDirectionParams};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Serialize;
use shorthand::{FormatShorthandParams, ParseShorthandParams};
use uuid::Uuid;

use crate::meds::compliance::SetOutcome;
use crate::meds::error::MedResult;
use crate::meds::shorthand as sh;
use crate::meds::types::{
    ComplianceLogEntry, Direction, DirectionFlag, OptSchedule, DIRECTION_DISCLAIMER,
};
use crate::service::MedService;

/// The doselog MCP tool handler. Every tool is a thin wrapper over [`MedService`].
#[derive(Clone)]
pub struct DoselogTools {
    tool_router: ToolRouter<Self>,
    service: Arc<MedService>,
}

impl DoselogTools {
    /// Run a service call on the blocking pool and encode its result as JSON.
    async fn call<T, F>(&self, f: F) -> Result<String, String>
    where
        F: FnOnce(&MedService) -> MedResult<T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let value = tokio::task::spawn_blocking(move || f(&service))
            .await
            .map_err(|e| format!("db task failed: {e}"))?
            .map_err(|e| e.to_string())?;
        serde_json::to_string(&value).map_err(|e| format!("serialization failed: {e}"))
    }
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("invalid time '{v}': {e}"))
        })
        .transpose()
}

fn parse_day(value: Option<&str>) -> Result<Option<NaiveDate>, String> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|e| format!("invalid date '{v}': {e}"))
        })
        .transpose()
}

#[tool_router]
impl DoselogTools {
    pub fn new(service: Arc<MedService>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    #[tool(description = "Parse prescription shorthand (e.g. 'Metformin 500mg PO bid') into a structured direction.")]
    async fn parse_shorthand(
        &self,
        Parameters(params): Parameters<ParseShorthandParams>,
    ) -> Result<String, String> {
        let direction = sh::parse(params.shorthand.trim()).map_err(|e| e.to_string())?;
        Ok(serde_json::json!({
            "direction": direction,
            "__disclaimer": DIRECTION_DISCLAIMER,
        })
        .to_string())
    }

    #[tool(description = "Render a structured direction back into prescription shorthand.")]
    async fn format_shorthand(
        &self,
        Parameters(params): Parameters<FormatShorthandParams>,
    ) -> Result<String, String> {
        let flags = params
            .flags
            .unwrap_or_default()
            .iter()
            .map(|f| f.parse::<DirectionFlag>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|e| e.to_string())?;
        let opt_schedule = params
            .schedule
            .as_deref()
            .unwrap_or_default()
            .parse::<OptSchedule>()
            .map_err(|e| e.to_string())?;
        let direction = Direction {
            name: params.name,
            period_hours: params.period_hours,
            dosage: params.dosage,
            dosage_unit: params.dosage_unit.unwrap_or_default(),
            dosage_route: params.dosage_route.unwrap_or_default(),
            flags,
            direction_shorthand: String::new(),
            opt_schedule,
        };
        direction.validate().map_err(|e| e.to_string())?;
        let (name, body) = sh::format(&direction);
        Ok(serde_json::json!({
            "name": name,
            "direction": body,
            "__disclaimer": DIRECTION_DISCLAIMER,
        })
        .to_string())
    }

    #[tool(description = "List all saved medication directions.")]
    async fn list_directions(
        &self,
        Parameters(_params): Parameters<ListDirectionsParams>,
    ) -> Result<String, String> {
        self.call(|s| s.list_directions()).await
    }

    #[tool(description = "Save a medication direction from shorthand. Replaces any direction with the same first word.")]
    async fn upsert_direction(
        &self,
        Parameters(params): Parameters<UpsertDirectionParams>,
    ) -> Result<String, String> {
        let direction = sh::parse(params.shorthand.trim()).map_err(|e| e.to_string())?;
        tracing::info!(med = %direction.key_name(), "upsert_direction called");
        self.call(move |s| s.upsert_direction(direction)).await
    }

    #[tool(description = "Delete a medication direction by key name (case-insensitive).")]
    async fn delete_direction(
        &self,
        Parameters(params): Parameters<DeleteDirectionParams>,
    ) -> Result<String, String> {
        tracing::info!(med = %params.name, "delete_direction called");
        self.call(move |s| s.delete_direction(&params.name)).await
    }

    #[tool(description = "Read the dose log for a date range (at most 180 days), newest first.")]
    async fn get_compliance_log(
        &self,
        Parameters(params): Parameters<GetComplianceLogParams>,
    ) -> Result<String, String> {
        let from = parse_day(params.from.as_deref())?;
        let to = parse_day(params.to.as_deref())?;
        let today = Utc::now().date_naive();
        self.call(move |s| s.compliance_log(from, to, params.med.as_deref(), today))
            .await
    }

    #[tool(description = "Record, update or remove a dose. Omit uuid to record a new dose; pass uuid with a negative dose to remove it.")]
    async fn post_compliance_log(
        &self,
        Parameters(params): Parameters<PostComplianceLogParams>,
    ) -> Result<String, String> {
        let at = parse_time(params.time.as_deref())?;
        let uuid = params
            .uuid
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| format!("invalid uuid: {e}"))?;
        let now = Utc::now();
        tracing::info!(med = %params.med, dose = ?params.dose, uuid = ?uuid, "post_compliance_log called");

        let med = params.med;
        let dose = params.dose;
        match uuid {
            None => self.call(move |s| s.take(&med, dose, at, now)).await,
            Some(uuid) => {
                let dose = dose.ok_or("dose is required when uuid is given")?;
                self.call(move |s| {
                    let mut entry = ComplianceLogEntry::new(med, at.unwrap_or(now), dose);
                    entry.uuid = Some(uuid);
                    s.post_compliance_log(entry, now).map(|outcome| match outcome {
                        SetOutcome::Saved(entry) => serde_json::json!({ "saved": entry }),
                        SetOutcome::Deleted => serde_json::json!({ "deleted": uuid }),
                        SetOutcome::AlreadyAbsent => serde_json::json!({ "deleted": null }),
                    })
                })
                .await
            }
        }
    }

    #[tool(description = "Project the next dose of a medication: expected time, offset in periods, and the dose it is measured from.")]
    async fn project_next_dose(
        &self,
        Parameters(params): Parameters<ProjectNextDoseParams>,
    ) -> Result<String, String> {
        let now = Utc::now();
        self.call(move |s| s.project_next_dose(&params.med, now)).await
    }

    #[tool(description = "Recompute stored dose offsets for a month range (YYYY-MM).")]
    async fn recalculate(
        &self,
        Parameters(params): Parameters<RecalculateParams>,
    ) -> Result<String, String> {
        let now = Utc::now();
        tracing::info!(from = ?params.from, to = ?params.to, "recalculate called");
        self.call(move |s| s.recalculate(params.from.as_deref(), params.to.as_deref(), now))
            .await
    }

    #[tool(description = "Show whether each medication is due, available, scheduled or unknown.")]
    async fn medication_status(
        &self,
        Parameters(params): Parameters<MedicationStatusParams>,
    ) -> Result<String, String> {
        let meds = params.meds.unwrap_or_default();
        let now = Utc::now();
        self.call(move |s| s.status(&meds, now)).await
    }
}

#[tool_handler]
impl ServerHandler for DoselogTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "doselog tracks medication directions and doses. Use upsert_direction to save a \
                 prescription, post_compliance_log to record a dose, and medication_status to \
                 see what is due."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
