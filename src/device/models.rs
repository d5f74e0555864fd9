use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::{scalar_fields, ControlState, HistoryRecord, IrrigationMode, RecordType};

/// Body of `GET /control` and `POST /control`:
/// `{ "irrigation_mode": "Auto", "pump_river": 0, "pump_farmland": 1 }`.
///
/// Older firmware echoes pump flags as JSON booleans, so both are accepted on
/// the way in. We always send 0/1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPayload {
    pub irrigation_mode: IrrigationMode,
    #[serde(deserialize_with = "flag")]
    pub pump_river: u8,
    #[serde(deserialize_with = "flag")]
    pub pump_farmland: u8,
}

impl From<&ControlState> for ControlPayload {
    fn from(s: &ControlState) -> Self {
        Self {
            irrigation_mode: s.irrigation_mode,
            pump_river: s.pump_river as u8,
            pump_farmland: s.pump_farmland as u8,
        }
    }
}

impl From<ControlPayload> for ControlState {
    fn from(p: ControlPayload) -> Self {
        Self {
            irrigation_mode: p.irrigation_mode,
            pump_river: p.pump_river != 0,
            pump_farmland: p.pump_farmland != 0,
        }
    }
}

fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(u64),
    }

    match Raw::deserialize(d)? {
        Raw::Bool(b) => Ok(b as u8),
        Raw::Int(0) => Ok(0),
        Raw::Int(1) => Ok(1),
        Raw::Int(other) => Err(serde::de::Error::custom(format!(
            "pump flag must be 0 or 1, got {other}"
        ))),
    }
}

/// A history entry as the controller serves it. Anything besides the three
/// named fields is a telemetry reading.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default)]
    pub sms_alert: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl From<HistoryEntry> for HistoryRecord {
    fn from(e: HistoryEntry) -> Self {
        Self {
            timestamp: e.timestamp,
            record_type: e.record_type,
            fields: scalar_fields(&e.rest),
            sms_alert: e.sms_alert,
        }
    }
}

/// Advisory output of the controller, passed through untouched.
///
/// Known fields are picked out only when they have the expected shape; a
/// value of any other shape stays in `extra` under its own key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Recommendations {
    /// Litres per hour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_needed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_prediction: Option<String>,
    /// Percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for Recommendations {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            water_needed: take(&mut extra, "water_needed"),
            crop_suggestion: take(&mut extra, "crop_suggestion"),
            soil_type: take(&mut extra, "soil_type"),
            weather_prediction: take(&mut extra, "weather_prediction"),
            confidence_score: take(&mut extra, "confidence_score"),
            extra,
        }
    }
}

/// Remove `key` from `map` if it parses as `T`; otherwise leave it in place.
fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let parsed = serde_json::from_value(map.get(key)?.clone()).ok()?;
    map.remove(key);
    Some(parsed)
}
