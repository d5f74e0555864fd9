use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    device::{DeviceApi, TransportErrorKind},
    models::TelemetrySnapshot,
    snapshot_store::{SnapshotStore, Trend},
};

#[derive(Debug, Default)]
struct PollState {
    store: SnapshotStore,
    last_error: Option<TransportErrorKind>,
    last_success: Option<DateTime<Utc>>,
    /// Session allowed to write. `None` while idle.
    session: Option<Uuid>,
}

/// Read-only handle onto the poller's snapshots and status.
///
/// Cheap to clone; every clone sees the same state.
#[derive(Debug, Clone, Default)]
pub struct TelemetryView {
    inner: Arc<RwLock<PollState>>,
}

/// Everything a display needs, read under one lock.
#[derive(Debug, Clone)]
pub struct TelemetryStatus {
    pub current: Option<TelemetrySnapshot>,
    pub trends: BTreeMap<String, Trend>,
    pub last_error: Option<TransportErrorKind>,
    pub last_success: Option<DateTime<Utc>>,
    pub running: bool,
}

impl TelemetryView {
    pub async fn current(&self) -> Option<TelemetrySnapshot> {
        self.inner.read().await.store.current().cloned()
    }

    pub async fn current_or(&self, fallback: &TelemetrySnapshot) -> TelemetrySnapshot {
        self.inner.read().await.store.current_or(fallback).clone()
    }

    pub async fn trend_of(&self, metric: &str) -> Trend {
        self.inner.read().await.store.trend_of(metric)
    }

    /// Kind of the most recent failure, cleared by the next successful poll.
    pub async fn last_error(&self) -> Option<TransportErrorKind> {
        self.inner.read().await.last_error
    }

    pub async fn status(&self) -> TelemetryStatus {
        let state = self.inner.read().await;
        TelemetryStatus {
            current: state.store.current().cloned(),
            trends: state.store.trends(),
            last_error: state.last_error,
            last_success: state.last_success,
            running: state.session.is_some(),
        }
    }
}

/// Periodically pulls a snapshot from the controller into a `SnapshotStore`.
///
/// `Idle -> Running -> Idle`. One fetch at a time: ticks that elapse while a
/// fetch is outstanding are skipped, not queued.
pub struct Poller {
    device: Arc<dyn DeviceApi>,
    view: TelemetryView,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(device: Arc<dyn DeviceApi>) -> Self {
        Self {
            device,
            view: TelemetryView::default(),
            task: None,
        }
    }

    pub fn view(&self) -> TelemetryView {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Fetch immediately, then every `interval`. Restarts the session if
    /// already running; the new session starts without the old one's error
    /// and success marks.
    pub async fn start(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        self.stop().await;

        let session = Uuid::new_v4();
        {
            let mut state = self.view.inner.write().await;
            state.session = Some(session);
            state.last_error = None;
            state.last_success = None;
        }

        let device = self.device.clone();
        let view = self.view.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                session = %session,
                interval_ms = interval.as_millis() as u64,
                "Telemetry polling started"
            );

            loop {
                ticker.tick().await;
                poll_once(device.as_ref(), &view, session).await;
            }
        }));
        Ok(())
    }

    /// Cancel the session. Once this returns no fetch will start and no
    /// in-flight result will be written.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        // Revoke write access before aborting: a fetch that completes in
        // between finds its session gone.
        let session = self.view.inner.write().await.session.take();
        task.abort();
        info!(session = ?session, "Telemetry polling stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if let Ok(mut state) = self.view.inner.try_write() {
                state.session = None;
            }
            task.abort();
        }
    }
}

async fn poll_once(device: &dyn DeviceApi, view: &TelemetryView, session: Uuid) {
    let result = device.fetch_snapshot().await;

    let mut state = view.inner.write().await;
    if state.session != Some(session) {
        debug!(session = %session, "Discarding poll result from an ended session");
        return;
    }

    match result {
        Ok(snapshot) => {
            state.last_success = Some(snapshot.captured_at());
            state.store.update(snapshot);
            if let Some(kind) = state.last_error.take() {
                info!(previous_error = %kind, "Controller reachable again");
            }
        }
        Err(e) => {
            warn!(error = %e, kind = %e.kind(), "Telemetry poll failed; keeping last snapshot");
            state.last_error = Some(e.kind());
        }
    }
}
