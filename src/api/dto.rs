use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    device::TransportErrorKind,
    history::{FilterCriteria, TypeFilter},
    models::{ControlState, HistoryRecord, IrrigationMode, MetricValue, RecordType, TelemetrySnapshot},
    sensors::TelemetryStatus,
    snapshot_store::Trend,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct TelemetryDto {
    /// Capture instant of the shown snapshot; `null` while showing the fallback.
    pub captured_at: Option<DateTime<Utc>>,
    /// Metric name to number, boolean or short string.
    #[schema(value_type = Object)]
    pub metrics: BTreeMap<String, MetricValue>,
    pub trends: BTreeMap<String, Trend>,
    /// Kind of the most recent poll failure, if the last poll failed.
    pub error: Option<TransportErrorKind>,
    /// `true` when the shown snapshot is older than the last failed poll.
    pub stale: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub polling: bool,
}

impl TelemetryDto {
    pub fn from_status(status: TelemetryStatus, fallback: &TelemetrySnapshot) -> Self {
        let shown = status.current.as_ref().unwrap_or(fallback);
        Self {
            captured_at: status.current.as_ref().map(TelemetrySnapshot::captured_at),
            metrics: shown.metrics().clone(),
            trends: status.trends,
            error: status.last_error,
            stale: status.last_error.is_some() && status.current.is_some(),
            last_success: status.last_success,
            polling: status.running,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ControlStateDto {
    pub irrigation_mode: IrrigationMode,
    pub pump_river: bool,
    pub pump_farmland: bool,
    /// A mutation is in flight and the values above are optimistic.
    pub pending: bool,
}

impl ControlStateDto {
    pub fn new(state: ControlState, pending: bool) -> Self {
        Self {
            irrigation_mode: state.irrigation_mode,
            pump_river: state.pump_river,
            pump_farmland: state.pump_farmland,
            pending,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryRecordDto {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[schema(value_type = Object)]
    pub fields: BTreeMap<String, MetricValue>,
    pub sms_alert: Option<String>,
}

impl From<HistoryRecord> for HistoryRecordDto {
    fn from(r: HistoryRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            record_type: r.record_type,
            fields: r.fields,
            sms_alert: r.sms_alert,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshDto {
    pub records: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// As delivered by the controller.
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "type")]
    pub record_type: Option<TypeFilter>,
    pub date: Option<String>,
    pub order: Option<Order>,
}

impl HistoryParams {
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria::new(self.record_type.unwrap_or_default(), self.date.as_deref())
    }
}
