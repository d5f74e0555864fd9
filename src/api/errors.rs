use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::{
    control::ControlError,
    device::{TransportError, TransportErrorKind},
    history::ExportError,
};

#[derive(Debug)]
pub enum AppError {
    /// The controller could not be reached or answered badly.
    Upstream(TransportError),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Upstream(e) => {
                let status = match e.kind() {
                    TransportErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    TransportErrorKind::Unreachable | TransportErrorKind::BadResponse => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                let body = Json(json!({ "error": e.to_string(), "kind": e.kind() }));
                (status, body).into_response()
            }
            Self::Internal(e) => {
                error!(error = %e, "Request failed");
                let body = Json(json!({ "error": e.to_string() }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        Self::Upstream(e)
    }
}

impl From<ControlError> for AppError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::Transport(e) => Self::Upstream(e),
        }
    }
}

impl From<ExportError> for AppError {
    fn from(e: ExportError) -> Self {
        Self::Internal(e.into())
    }
}
