use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// A number, boolean or short enumerated string reported by the controller.
// Flag must stay ahead of Number for untagged deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Convert a scalar JSON value. `null`, arrays and objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Flag(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean reading of the value. The controller encodes switches either
    /// as JSON booleans or as `0`/`1`.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Number(v) => Some(*v != 0.0),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Keep every scalar field of a JSON object, dropping the rest.
pub(crate) fn scalar_fields<'a, I>(fields: I) -> BTreeMap<String, MetricValue>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    fields
        .into_iter()
        .filter_map(|(k, v)| MetricValue::from_json(v).map(|m| (k.clone(), m)))
        .collect()
}

/// One poll's worth of readings. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    captured_at: DateTime<Utc>,
    metrics: BTreeMap<String, MetricValue>,
}

impl TelemetrySnapshot {
    pub fn new(captured_at: DateTime<Utc>, metrics: BTreeMap<String, MetricValue>) -> Self {
        Self { captured_at, metrics }
    }

    /// A snapshot with no readings, used as the display fallback before the
    /// first successful poll.
    pub fn empty() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH, BTreeMap::new())
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn get(&self, metric: &str) -> Option<&MetricValue> {
        self.metrics.get(metric)
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricValue> {
        &self.metrics
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum IrrigationMode {
    #[default]
    #[serde(alias = "auto", alias = "AUTO")]
    Auto,
    #[serde(alias = "manual", alias = "MANUAL")]
    Manual,
}

impl fmt::Display for IrrigationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "Auto",
            Self::Manual => "Manual",
        })
    }
}

impl FromStr for IrrigationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(anyhow!("unknown irrigation mode: {other:?}")),
        }
    }
}

/// Commanded state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ControlState {
    pub irrigation_mode: IrrigationMode,
    pub pump_river: bool,
    pub pump_farmland: bool,
}

/// A requested change. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ControlMutation {
    #[serde(default)]
    pub irrigation_mode: Option<IrrigationMode>,
    #[serde(default)]
    pub pump_river: Option<bool>,
    #[serde(default)]
    pub pump_farmland: Option<bool>,
}

impl ControlMutation {
    pub fn touches_pump(&self) -> bool {
        self.pump_river.is_some() || self.pump_farmland.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Sensor,
    Control,
    SmsAlert,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sensor => "sensor",
            Self::Control => "control",
            Self::SmsAlert => "sms_alert",
        })
    }
}

/// One persisted event from the controller's history log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    /// ISO-8601-like, sorts lexicographically.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(flatten)]
    pub fields: BTreeMap<String, MetricValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_alert: Option<String>,
}

impl HistoryRecord {
    pub fn new(timestamp: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            timestamp: timestamp.into(),
            record_type,
            fields: BTreeMap::new(),
            sms_alert: None,
        }
    }

    pub fn with_field(mut self, name: &str, value: MetricValue) -> Self {
        self.fields.insert(name.to_owned(), value);
        self
    }

    pub fn with_alert(mut self, message: impl Into<String>) -> Self {
        self.sms_alert = Some(message.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&MetricValue> {
        self.fields.get(field)
    }
}
