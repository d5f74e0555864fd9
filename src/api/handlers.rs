use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use utoipa::OpenApi;

use super::{
    dto::{ControlStateDto, HistoryParams, HistoryRecordDto, Order, RefreshDto, TelemetryDto},
    errors::AppError,
    AppState,
};
use crate::{
    device::{models::Recommendations, TransportErrorKind},
    history::{newest_first, Summary, TypeFilter, EXPORT_FILENAME},
    models::{ControlMutation, IrrigationMode, RecordType},
    snapshot_store::Trend,
};

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Latest snapshot with per-metric trends. Before the first successful poll
/// the configured fallback is shown and `captured_at` is `null`.
#[utoipa::path(
    get,
    path = "/telemetry",
    responses(
        (status = 200, description = "Current telemetry", body = TelemetryDto),
    ),
    tag = "telemetry"
)]
pub async fn get_telemetry(State(state): State<AppState>) -> Json<TelemetryDto> {
    let status = state.telemetry.status().await;
    Json(TelemetryDto::from_status(status, &state.fallback))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Control state as the operator should see it, optimistic while pending.
#[utoipa::path(
    get,
    path = "/control",
    responses(
        (status = 200, description = "Current control state", body = ControlStateDto),
    ),
    tag = "control"
)]
pub async fn get_control(State(state): State<AppState>) -> Json<ControlStateDto> {
    Json(ControlStateDto::new(
        state.control.current(),
        state.control.is_pending(),
    ))
}

/// Apply a control mutation. Toggling a pump without naming a mode switches
/// to `Manual`. On failure the state rolls back and nothing is retried.
#[utoipa::path(
    post,
    path = "/control",
    request_body = ControlMutation,
    responses(
        (status = 200, description = "Acknowledged control state", body = ControlStateDto),
        (status = 502, description = "Controller unreachable or rejected the update"),
        (status = 504, description = "Controller timed out"),
    ),
    tag = "control"
)]
pub async fn post_control(
    State(state): State<AppState>,
    Json(mutation): Json<ControlMutation>,
) -> Result<Json<ControlStateDto>, AppError> {
    let confirmed = state.control.apply(mutation).await?;
    Ok(Json(ControlStateDto::new(confirmed, false)))
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Re-fetch the controller's history log into the local cache.
#[utoipa::path(
    post,
    path = "/history/refresh",
    responses(
        (status = 200, description = "Number of cached records", body = RefreshDto),
        (status = 502, description = "Controller unreachable or answered badly; cache emptied"),
        (status = 504, description = "Controller timed out; cache emptied"),
    ),
    tag = "history"
)]
pub async fn refresh_history(State(state): State<AppState>) -> Result<Json<RefreshDto>, AppError> {
    let records = state.history.refresh().await?;
    Ok(Json(RefreshDto { records }))
}

/// Cached history filtered by type and timestamp prefix.
#[utoipa::path(
    get,
    path = "/history",
    params(
        ("type"  = Option<TypeFilter>, Query, description = "Record type, default `all`"),
        ("date"  = Option<String>,     Query, description = "Timestamp prefix, e.g. `2025-01-01`"),
        ("order" = Option<Order>,      Query, description = "`asc` keeps controller order, `desc` is newest first"),
    ),
    responses(
        (status = 200, description = "Matching records", body = Vec<HistoryRecordDto>),
    ),
    tag = "history"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryRecordDto>> {
    let mut records = state.history.filtered(&params.criteria()).await;
    if params.order == Some(Order::Desc) {
        records = newest_first(&records);
    }
    Json(records.into_iter().map(Into::into).collect())
}

/// Means per metric and total water usage over the filtered history.
#[utoipa::path(
    get,
    path = "/history/summary",
    params(
        ("type" = Option<TypeFilter>, Query, description = "Record type, default `all`"),
        ("date" = Option<String>,     Query, description = "Timestamp prefix"),
    ),
    responses(
        (status = 200, description = "Summary; `null` means no data", body = Summary),
    ),
    tag = "history"
)]
pub async fn get_history_summary(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Summary> {
    Json(state.history.summary(&params.criteria()).await)
}

/// Filtered history as `irrigation_history.csv`.
#[utoipa::path(
    get,
    path = "/history/export",
    params(
        ("type" = Option<TypeFilter>, Query, description = "Record type, default `all`"),
        ("date" = Option<String>,     Query, description = "Timestamp prefix"),
    ),
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv", body = String),
    ),
    tag = "history"
)]
pub async fn export_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.history.export_csv(&params.criteria()).await?;
    let disposition = format!("attachment; filename=\"{EXPORT_FILENAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// Controller's advisory output, passed through as-is.
#[utoipa::path(
    get,
    path = "/recommendations",
    responses(
        (status = 200, description = "Advisory snapshot; fields vary by firmware", content_type = "application/json"),
        (status = 502, description = "Controller unreachable or answered badly"),
        (status = 504, description = "Controller timed out"),
    ),
    tag = "telemetry"
)]
pub async fn get_recommendations(
    State(state): State<AppState>,
) -> Result<Json<Recommendations>, AppError> {
    Ok(Json(state.device.fetch_recommendations().await?))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_telemetry,
        get_control,
        post_control,
        refresh_history,
        get_history,
        get_history_summary,
        export_history,
        get_recommendations,
        health,
    ),
    components(schemas(
        TelemetryDto,
        Trend,
        TransportErrorKind,
        ControlStateDto,
        ControlMutation,
        IrrigationMode,
        HistoryRecordDto,
        RecordType,
        TypeFilter,
        Order,
        Summary,
        RefreshDto,
    )),
    tags(
        (name = "telemetry", description = "Live controller readings"),
        (name = "control",   description = "Pump and mode control"),
        (name = "history",   description = "Cached history log, summaries and CSV export"),
        (name = "system",    description = "System endpoints"),
    ),
    info(
        title = "Irrigation Telemetry API",
        version = "0.1.0",
        description = "Live telemetry, control and history for a remote irrigation controller"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
