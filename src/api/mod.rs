pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    control::ControlDispatcher,
    device::DeviceApi,
    history::HistoryService,
    models::TelemetrySnapshot,
    sensors::TelemetryView,
};
use handlers::ApiDoc;

/// Everything the handlers read from. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: TelemetryView,
    pub control: ControlDispatcher,
    pub history: HistoryService,
    pub device: Arc<dyn DeviceApi>,
    /// Shown until the first poll succeeds.
    pub fallback: Arc<TelemetrySnapshot>,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/telemetry", get(handlers::get_telemetry))
        .route(
            "/control",
            get(handlers::get_control).post(handlers::post_control),
        )
        .route("/history", get(handlers::get_history))
        .route("/history/refresh", post(handlers::refresh_history))
        .route("/history/summary", get(handlers::get_history_summary))
        .route("/history/export", get(handlers::export_history))
        .route("/recommendations", get(handlers::get_recommendations))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
