use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{HistoryRecord, RecordType};

/// Numeric columns that always appear in a summary, with or without data.
pub const SUMMARY_METRICS: [&str; 5] = [
    "soil_moisture",
    "soil_temp",
    "tank_level",
    "ambient_temp",
    "humidity",
];

pub const WATER_USAGE: &str = "water_usage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    #[default]
    All,
    Sensor,
    Control,
    SmsAlert,
}

impl TypeFilter {
    pub fn matches(self, record_type: RecordType) -> bool {
        match self {
            Self::All => true,
            Self::Sensor => record_type == RecordType::Sensor,
            Self::Control => record_type == RecordType::Control,
            Self::SmsAlert => record_type == RecordType::SmsAlert,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "sensor" => Ok(Self::Sensor),
            "control" => Ok(Self::Control),
            "sms_alert" => Ok(Self::SmsAlert),
            other => Err(anyhow!("unknown record type filter: {other:?}")),
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Sensor => "sensor",
            Self::Control => "control",
            Self::SmsAlert => "sms_alert",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    pub record_type: TypeFilter,
    /// Timestamp prefix, e.g. `2025-01` or `2025-01-01`. Empty means any.
    pub date: Option<String>,
}

impl FilterCriteria {
    pub fn new(record_type: TypeFilter, date: Option<&str>) -> Self {
        Self {
            record_type,
            date: date.map(str::to_owned),
        }
    }

    pub fn matches(&self, record: &HistoryRecord) -> bool {
        let date_ok = match self.date.as_deref() {
            None | Some("") => true,
            Some(prefix) => record.timestamp.starts_with(prefix),
        };
        date_ok && self.record_type.matches(record.record_type)
    }
}

/// Records matching `criteria`, in input order.
pub fn filter(records: &[HistoryRecord], criteria: &FilterCriteria) -> Vec<HistoryRecord> {
    records
        .iter()
        .filter(|r| criteria.matches(r))
        .cloned()
        .collect()
}

/// Display ordering: latest timestamp first. The input is left untouched.
pub fn newest_first(records: &[HistoryRecord]) -> Vec<HistoryRecord> {
    let mut sorted = records.to_vec();
    // Stable, so equal timestamps keep delivery order.
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Summary {
    pub record_count: usize,
    /// `None` marks a metric with no data.
    pub mean_by_metric: BTreeMap<String, Option<f64>>,
    /// `None` when no record carries `water_usage`.
    pub total_water_usage: Option<f64>,
}

impl Summary {
    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.mean_by_metric.get(metric).copied().flatten()
    }
}

/// Mean of every numeric metric over the records that carry it, plus total
/// water usage. Missing readings are skipped, never counted as zero.
pub fn summarize(records: &[HistoryRecord]) -> Summary {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    let mut water: Option<f64> = None;

    for record in records {
        for (name, value) in &record.fields {
            let Some(v) = value.as_number() else {
                continue;
            };
            let entry = sums.entry(name.as_str()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
            if name == WATER_USAGE {
                *water.get_or_insert(0.0) += v;
            }
        }
    }

    let mut mean_by_metric: BTreeMap<String, Option<f64>> = SUMMARY_METRICS
        .iter()
        .map(|m| (m.to_string(), None))
        .collect();
    for (name, (sum, count)) in sums {
        mean_by_metric.insert(name.to_owned(), Some(sum / count as f64));
    }

    Summary {
        record_count: records.len(),
        mean_by_metric,
        total_water_usage: water,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricValue;

    fn num(v: f64) -> MetricValue {
        MetricValue::Number(v)
    }

    fn sample() -> Vec<HistoryRecord> {
        vec![
            HistoryRecord::new("2025-01-01 10:00", RecordType::Sensor)
                .with_field("soil_moisture", num(40.0))
                .with_field("tank_level", num(80.0))
                .with_field("water_usage", num(12.0)),
            HistoryRecord::new("2025-01-01 10:05", RecordType::Control)
                .with_field("pump_river", MetricValue::Flag(true)),
            HistoryRecord::new("2025-01-02 08:00", RecordType::Sensor)
                .with_field("soil_moisture", num(30.0))
                .with_field("water_usage", num(3.5)),
            HistoryRecord::new("2025-01-02 08:30", RecordType::SmsAlert).with_alert("Tank low"),
        ]
    }

    #[test]
    fn all_with_empty_date_is_identity() {
        let records = sample();
        let c = FilterCriteria::new(TypeFilter::All, Some(""));
        assert_eq!(filter(&records, &c), records);
        assert_eq!(filter(&records, &FilterCriteria::default()), records);
    }

    #[test]
    fn type_filter_keeps_matching_records_in_order() {
        let out = filter(&sample(), &FilterCriteria::new(TypeFilter::Sensor, None));
        let ts: Vec<_> = out.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(ts, vec!["2025-01-01 10:00", "2025-01-02 08:00"]);
    }

    #[test]
    fn date_prefix_and_type_combine() {
        let records = sample();
        let out = filter(&records, &FilterCriteria::new(TypeFilter::All, Some("2025-01-02")));
        assert_eq!(out.len(), 2);

        let out = filter(
            &records,
            &FilterCriteria::new(TypeFilter::SmsAlert, Some("2025-01-01")),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn filter_is_idempotent_and_leaves_input_alone() {
        let records = sample();
        let before = records.clone();
        let c = FilterCriteria::new(TypeFilter::Sensor, Some("2025-01"));

        let once = filter(&records, &c);
        let twice = filter(&once, &c);

        assert_eq!(once, twice);
        assert_eq!(records, before);
    }

    #[test]
    fn type_filter_parses_wire_names() {
        assert_eq!("sms_alert".parse::<TypeFilter>().unwrap(), TypeFilter::SmsAlert);
        assert_eq!("all".parse::<TypeFilter>().unwrap(), TypeFilter::All);
        assert!("alerts".parse::<TypeFilter>().is_err());
        assert_eq!(TypeFilter::SmsAlert.to_string(), "sms_alert");
    }

    #[test]
    fn newest_first_sorts_a_copy() {
        let records = sample();
        let sorted = newest_first(&records);
        assert_eq!(sorted[0].timestamp, "2025-01-02 08:30");
        assert_eq!(sorted[3].timestamp, "2025-01-01 10:00");
        assert_eq!(records[0].timestamp, "2025-01-01 10:00");
    }

    #[test]
    fn summarize_skips_missing_readings() {
        let s = summarize(&sample());

        assert_eq!(s.record_count, 4);
        assert_eq!(s.mean("soil_moisture"), Some(35.0));
        // Only one record has tank_level; the rest are not zeros.
        assert_eq!(s.mean("tank_level"), Some(80.0));
        assert_eq!(s.mean("humidity"), None);
        assert!(s.mean_by_metric.contains_key("humidity"));
        assert_eq!(s.total_water_usage, Some(15.5));
        // Flags are not averaged.
        assert!(!s.mean_by_metric.contains_key("pump_river"));
    }

    #[test]
    fn summarize_empty_reports_no_data() {
        let s = summarize(&[]);
        assert_eq!(s.record_count, 0);
        assert_eq!(s.total_water_usage, None);
        assert_eq!(s.mean_by_metric.len(), SUMMARY_METRICS.len());
        assert!(s.mean_by_metric.values().all(Option::is_none));
    }
}
