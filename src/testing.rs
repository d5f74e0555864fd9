//! Scripted stand-in for the irrigation controller, shared by unit tests.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use crate::{
    device::{models::Recommendations, DeviceApi, TransportError, TransportErrorKind},
    models::{ControlState, HistoryRecord, MetricValue, TelemetrySnapshot},
};

type Readings = BTreeMap<String, MetricValue>;

#[derive(Default)]
pub struct FakeDevice {
    script: Mutex<Script>,
    snapshot_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    control_gate: Mutex<Option<Arc<Semaphore>>>,
}

#[derive(Default)]
struct Script {
    snapshots: VecDeque<(Duration, Result<Readings, TransportErrorKind>)>,
    history: Option<Result<Vec<HistoryRecord>, TransportErrorKind>>,
    device_control: ControlState,
    control_failures: VecDeque<TransportErrorKind>,
    sent: Vec<ControlState>,
    recommendations: Recommendations,
}

pub fn readings(pairs: &[(&str, f64)]) -> Readings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), MetricValue::Number(*v)))
        .collect()
}

fn fail(kind: TransportErrorKind, endpoint: &'static str) -> TransportError {
    TransportError::new(kind, endpoint, "scripted failure")
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_snapshot(&self, pairs: &[(&str, f64)]) {
        self.push_snapshot_after(Duration::ZERO, pairs);
    }

    /// Queue a snapshot that takes `delay` to arrive.
    pub fn push_snapshot_after(&self, delay: Duration, pairs: &[(&str, f64)]) {
        self.script
            .lock()
            .unwrap()
            .snapshots
            .push_back((delay, Ok(readings(pairs))));
    }

    pub fn push_snapshot_error(&self, kind: TransportErrorKind) {
        self.script
            .lock()
            .unwrap()
            .snapshots
            .push_back((Duration::ZERO, Err(kind)));
    }

    pub fn set_history(&self, history: Result<Vec<HistoryRecord>, TransportErrorKind>) {
        self.script.lock().unwrap().history = Some(history);
    }

    pub fn set_device_control(&self, state: ControlState) {
        self.script.lock().unwrap().device_control = state;
    }

    pub fn fail_next_control_send(&self, kind: TransportErrorKind) {
        self.script.lock().unwrap().control_failures.push_back(kind);
    }

    pub fn set_recommendations(&self, rec: Recommendations) {
        self.script.lock().unwrap().recommendations = rec;
    }

    /// Make every control send wait for a permit on the returned semaphore.
    pub fn hold_control_sends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.control_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn sent_controls(&self) -> Vec<ControlState> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceApi for FakeDevice {
    async fn fetch_snapshot(&self) -> Result<TelemetrySnapshot, TransportError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let next = self.script.lock().unwrap().snapshots.pop_front();
        let result = match next {
            Some((delay, outcome)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                outcome
            }
            None => Err(TransportErrorKind::Unreachable),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
            .map(|r| TelemetrySnapshot::new(Utc::now(), r))
            .map_err(|kind| fail(kind, "/sensors"))
    }

    async fn fetch_history(&self) -> Result<Vec<HistoryRecord>, TransportError> {
        match self.script.lock().unwrap().history.clone() {
            Some(Ok(records)) => Ok(records),
            Some(Err(kind)) => Err(fail(kind, "/history")),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_control(&self) -> Result<ControlState, TransportError> {
        Ok(self.script.lock().unwrap().device_control)
    }

    async fn send_control(&self, state: &ControlState) -> Result<ControlState, TransportError> {
        self.script.lock().unwrap().sent.push(*state);

        let gate = self.control_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let mut script = self.script.lock().unwrap();
        match script.control_failures.pop_front() {
            Some(kind) => Err(fail(kind, "/control")),
            None => {
                script.device_control = *state;
                Ok(*state)
            }
        }
    }

    async fn fetch_recommendations(&self) -> Result<Recommendations, TransportError> {
        Ok(self.script.lock().unwrap().recommendations.clone())
    }
}
