pub mod error;
pub mod models;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    config::Config,
    models::{scalar_fields, ControlState, HistoryRecord, TelemetrySnapshot},
};

pub use self::error::{TransportError, TransportErrorKind};
use self::models::{ControlPayload, HistoryEntry, Recommendations};

const SENSORS: &str = "/sensors";
const CONTROL: &str = "/control";
const HISTORY: &str = "/history";
const RECOMMENDATIONS: &str = "/ai-recommendations";

/// Everything the engine asks of the irrigation controller.
///
/// No retries and no caching happen behind this trait; callers own both.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, TransportError>;

    async fn fetch_history(&self) -> Result<Vec<HistoryRecord>, TransportError>;

    async fn fetch_control(&self) -> Result<ControlState, TransportError>;

    /// Send the full desired state; returns the state the controller echoed.
    async fn send_control(&self, state: &ControlState) -> Result<ControlState, TransportError>;

    async fn fetch_recommendations(&self) -> Result<Recommendations, TransportError>;
}

/// JSON-over-HTTP client for the controller.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_timeout(&config.device_base_url, config.request_timeout)
    }

    /// Every request, body read included, is bounded by `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build controller HTTP client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_owned(),
            }),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, TransportError> {
        let url = format!("{}{}", self.inner.base_url, path);
        debug!(url = %url, "GET controller");

        let bytes = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::from_reqwest(path, e))?
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(path, e))?;

        serde_json::from_slice(&bytes).map_err(|e| TransportError::bad_response(path, e))
    }
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, TransportError> {
        let body: Map<String, Value> = self.get_json(SENSORS).await?;
        Ok(TelemetrySnapshot::new(Utc::now(), scalar_fields(&body)))
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryRecord>, TransportError> {
        let entries: Vec<HistoryEntry> = self.get_json(HISTORY).await?;
        Ok(entries.into_iter().map(HistoryRecord::from).collect())
    }

    async fn fetch_control(&self) -> Result<ControlState, TransportError> {
        let payload: ControlPayload = self.get_json(CONTROL).await?;
        Ok(payload.into())
    }

    async fn send_control(&self, state: &ControlState) -> Result<ControlState, TransportError> {
        let url = format!("{}{}", self.inner.base_url, CONTROL);
        let body = ControlPayload::from(state);
        debug!(url = %url, mode = %state.irrigation_mode, "POST controller");

        let bytes = self
            .inner
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::from_reqwest(CONTROL, e))?
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(CONTROL, e))?;

        let echoed: ControlPayload =
            serde_json::from_slice(&bytes).map_err(|e| TransportError::bad_response(CONTROL, e))?;
        Ok(echoed.into())
    }

    async fn fetch_recommendations(&self) -> Result<Recommendations, TransportError> {
        self.get_json(RECOMMENDATIONS).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::models::{IrrigationMode, MetricValue, RecordType};

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> DeviceClient {
        DeviceClient::with_timeout(base_url, Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn fetch_snapshot_keeps_scalar_fields() {
        let url = serve(Router::new().route(
            "/sensors",
            get(|| async {
                Json(json!({
                    "soil_moisture": 38.5,
                    "tank_level": 120,
                    "pump_river": true,
                    "irrigation_mode": "Auto",
                    "meta": { "fw": "1.2" }
                }))
            }),
        ))
        .await;

        let snap = client(&url).fetch_snapshot().await.unwrap();
        assert_eq!(snap.get("soil_moisture"), Some(&MetricValue::Number(38.5)));
        assert_eq!(snap.get("tank_level"), Some(&MetricValue::Number(120.0)));
        assert_eq!(snap.get("pump_river"), Some(&MetricValue::Flag(true)));
        assert_eq!(snap.get("irrigation_mode"), Some(&MetricValue::Text("Auto".into())));
        assert!(snap.get("meta").is_none());
    }

    #[tokio::test]
    async fn fetch_history_preserves_device_order() {
        let url = serve(Router::new().route(
            "/history",
            get(|| async {
                Json(json!([
                    { "timestamp": "2025-01-01 10:00", "type": "sensor", "soil_moisture": 40 },
                    { "timestamp": "2025-01-01 10:05", "type": "control", "pump_river": 1 },
                    { "timestamp": "2025-01-01 10:10", "type": "sms_alert", "sms_alert": "Tank low" }
                ]))
            }),
        ))
        .await;

        let records = client(&url).fetch_history().await.unwrap();
        let kinds: Vec<_> = records.iter().map(|r| r.record_type).collect();
        assert_eq!(
            kinds,
            vec![RecordType::Sensor, RecordType::Control, RecordType::SmsAlert]
        );
        assert_eq!(records[2].sms_alert.as_deref(), Some("Tank low"));
    }

    #[tokio::test]
    async fn send_control_posts_flags_as_ints_and_returns_echo() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();
        let url = serve(Router::new().route(
            "/control",
            axum::routing::post(move |Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                async move {
                    *seen.lock().unwrap() = Some(body.clone());
                    Json(body)
                }
            }),
        ))
        .await;

        let wanted = ControlState {
            irrigation_mode: IrrigationMode::Manual,
            pump_river: true,
            pump_farmland: false,
        };
        let echoed = client(&url).send_control(&wanted).await.unwrap();

        assert_eq!(echoed, wanted);
        assert_eq!(
            seen.lock().unwrap().clone().unwrap(),
            json!({ "irrigation_mode": "Manual", "pump_river": 1, "pump_farmland": 0 })
        );
    }

    #[tokio::test]
    async fn fetch_control_reads_current_state() {
        let url = serve(Router::new().route(
            "/control",
            get(|| async {
                Json(json!({ "irrigation_mode": "auto", "pump_river": 0, "pump_farmland": 1 }))
            }),
        ))
        .await;

        let state = client(&url).fetch_control().await.unwrap();
        assert_eq!(state.irrigation_mode, IrrigationMode::Auto);
        assert!(!state.pump_river);
        assert!(state.pump_farmland);
    }

    #[tokio::test]
    async fn error_status_is_bad_response() {
        let url = serve(Router::new().route(
            "/sensors",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;

        let err = client(&url).fetch_snapshot().await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::BadResponse);
        assert_eq!(err.endpoint(), "/sensors");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_response() {
        let url = serve(Router::new().route("/history", get(|| async { "not json" }))).await;

        let err = client(&url).fetch_history().await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::BadResponse);
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let url = serve(Router::new().route(
            "/sensors",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        ))
        .await;

        let err = client(&url).fetch_snapshot().await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .fetch_snapshot()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn recommendations_pass_through() {
        let url = serve(Router::new().route(
            "/ai-recommendations",
            get(|| async {
                Json(json!({
                    "water_needed": 5.75,
                    "soil_type": "Loam",
                    "confidence_score": "92%"
                }))
            }),
        ))
        .await;

        let rec = client(&url).fetch_recommendations().await.unwrap();
        assert_eq!(rec.water_needed, Some(5.75));
        assert_eq!(rec.soil_type.as_deref(), Some("Loam"));
        assert_eq!(rec.confidence_score, None);
        assert_eq!(rec.extra["confidence_score"], "92%");
    }
}
