//! HTTP/JSON transport, mounted under `/meds`.
//!
//! Handlers are thin: decode, run the [`MedService`] call on the blocking pool,
//! encode. Errors render as `{"error": "..."}` with a status derived from the
//! [`MedError`] kind.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::meds::compliance::SetOutcome;
use crate::meds::error::{MedError, MedResult};
use crate::meds::shorthand;
use crate::meds::types::{ComplianceLogEntry, Direction, DIRECTION_DISCLAIMER};
use crate::service::{MedService, MedStatus};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Med(#[from] MedError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Med(MedError::Parse { .. } | MedError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Med(MedError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Med(MedError::Storage(_)) | ApiError::Internal(_) => {
                tracing::error!(error = %self, "API internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run a service call on the blocking pool.
async fn blocking<T, F>(service: &Arc<MedService>, f: F) -> ApiResult<T>
where
    F: FnOnce(&MedService) -> MedResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(service);
    let result = tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::Internal(format!("task failed: {e}")))?;
    Ok(result?)
}

/// Build the router. Paths are relative to `/meds`.
pub fn router(service: Arc<MedService>) -> Router {
    let meds = Router::new()
        .route("/shorthand/parse", get(parse_query).post(parse_form))
        .route("/shorthand/format", post(format_direction))
        .route("/directions", get(list_directions).post(upsert_direction))
        .route("/directions/{name}", delete(delete_direction))
        .route("/compliance/log", get(get_log).post(post_log))
        .route("/compliance/med/{med}/log", get(get_med_log))
        .route("/compliance/med/{med}/project", get(project))
        .route("/compliance/recalc", post(recalc))
        .route("/status", get(status))
        .with_state(service);

    Router::new().nest("/meds", meds)
}

#[derive(Debug, Deserialize)]
struct ShorthandInput {
    #[serde(default)]
    shorthand: String,
}

#[derive(Serialize)]
struct ParsedDirection {
    #[serde(flatten)]
    direction: Direction,
    #[serde(rename = "__disclaimer")]
    disclaimer: &'static str,
}

fn parse_shorthand(input: &str) -> ApiResult<Json<ParsedDirection>> {
    let direction = shorthand::parse(input.trim())?;
    Ok(Json(ParsedDirection {
        direction,
        disclaimer: DIRECTION_DISCLAIMER,
    }))
}

async fn parse_query(Query(input): Query<ShorthandInput>) -> ApiResult<Json<ParsedDirection>> {
    parse_shorthand(&input.shorthand)
}

async fn parse_form(Form(input): Form<ShorthandInput>) -> ApiResult<Json<ParsedDirection>> {
    parse_shorthand(&input.shorthand)
}

async fn format_direction(Json(direction): Json<Direction>) -> Json<serde_json::Value> {
    let (name, body) = shorthand::format(&direction);
    Json(json!({
        "name": name,
        "direction": body,
        "__disclaimer": DIRECTION_DISCLAIMER,
    }))
}

async fn list_directions(State(service): State<Arc<MedService>>) -> ApiResult<Json<Vec<Direction>>> {
    Ok(Json(blocking(&service, |s| s.list_directions()).await?))
}

async fn upsert_direction(
    State(service): State<Arc<MedService>>,
    Json(direction): Json<Direction>,
) -> ApiResult<Json<Direction>> {
    Ok(Json(
        blocking(&service, move |s| s.upsert_direction(direction)).await?,
    ))
}

async fn delete_direction(
    State(service): State<Arc<MedService>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Direction>> {
    Ok(Json(
        blocking(&service, move |s| s.delete_direction(&name)).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

fn parse_day(value: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|e| ApiError::BadRequest(format!("invalid date '{v}': {e}")))
        })
        .transpose()
}

async fn read_log(
    service: &Arc<MedService>,
    query: RangeQuery,
    med: Option<String>,
) -> ApiResult<Json<Vec<ComplianceLogEntry>>> {
    let from = parse_day(query.from.as_deref())?;
    let to = parse_day(query.to.as_deref())?;
    let today = Utc::now().date_naive();
    Ok(Json(
        blocking(service, move |s| {
            s.compliance_log(from, to, med.as_deref(), today)
        })
        .await?,
    ))
}

async fn get_log(
    State(service): State<Arc<MedService>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<ComplianceLogEntry>>> {
    read_log(&service, query, None).await
}

async fn get_med_log(
    State(service): State<Arc<MedService>>,
    Path(med): Path<String>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<ComplianceLogEntry>>> {
    read_log(&service, query, Some(med)).await
}

async fn post_log(
    State(service): State<Arc<MedService>>,
    Json(entry): Json<ComplianceLogEntry>,
) -> ApiResult<Response> {
    let outcome = blocking(&service, move |s| s.post_compliance_log(entry, Utc::now())).await?;
    Ok(match outcome {
        SetOutcome::Saved(entry) => Json(entry).into_response(),
        SetOutcome::Deleted | SetOutcome::AlreadyAbsent => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn project(
    State(service): State<Arc<MedService>>,
    Path(med): Path<String>,
) -> ApiResult<Json<ComplianceLogEntry>> {
    Ok(Json(
        blocking(&service, move |s| s.project_next_dose(&med, Utc::now())).await?,
    ))
}

async fn recalc(
    State(service): State<Arc<MedService>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<StatusCode> {
    blocking(&service, move |s| {
        s.recalculate(query.from.as_deref(), query.to.as_deref(), Utc::now())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    /// Comma-separated key names; empty means all.
    #[serde(default)]
    med: String,
}

async fn status(
    State(service): State<Arc<MedService>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<MedStatus>>> {
    let meds: Vec<String> = query
        .med
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Json(
        blocking(&service, move |s| s.status(&meds, Utc::now())).await?,
    ))
}
