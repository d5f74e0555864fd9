use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::TelemetrySnapshot;

/// Direction of a metric between the previous and the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
    /// Missing or non-numeric in either snapshot.
    Unknown,
}

/// The two most recent snapshots: `current` and the one it replaced.
///
/// Owned by the poller; everyone else reads through `TelemetryView`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Option<TelemetrySnapshot>,
    previous: Option<TelemetrySnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `snapshot` as current and age the old current into previous.
    /// An identical snapshot still counts as a fresh observation.
    pub fn update(&mut self, snapshot: TelemetrySnapshot) {
        self.previous = self.current.replace(snapshot);
    }

    pub fn current(&self) -> Option<&TelemetrySnapshot> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&TelemetrySnapshot> {
        self.previous.as_ref()
    }

    /// The current snapshot, or `fallback` if no poll has succeeded yet.
    pub fn current_or<'a>(&'a self, fallback: &'a TelemetrySnapshot) -> &'a TelemetrySnapshot {
        self.current.as_ref().unwrap_or(fallback)
    }

    pub fn trend_of(&self, metric: &str) -> Trend {
        let value = |s: &Option<TelemetrySnapshot>| {
            s.as_ref()
                .and_then(|s| s.get(metric))
                .and_then(|v| v.as_number())
        };

        match (value(&self.previous), value(&self.current)) {
            (Some(prev), Some(curr)) => compare(prev, curr),
            _ => Trend::Unknown,
        }
    }

    /// Trend of every metric carried by the current snapshot.
    pub fn trends(&self) -> BTreeMap<String, Trend> {
        self.current
            .iter()
            .flat_map(|s| s.metrics().keys())
            .map(|k| (k.clone(), self.trend_of(k)))
            .collect()
    }
}

fn compare(prev: f64, curr: f64) -> Trend {
    if curr > prev {
        Trend::Up
    } else if curr < prev {
        Trend::Down
    } else if curr == prev {
        Trend::Flat
    } else {
        // NaN on either side
        Trend::Unknown
    }
}
