use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    device::{DeviceApi, TransportError, TransportErrorKind},
    models::{ControlMutation, ControlState, IrrigationMode},
};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control update failed: {0}")]
    Transport(#[from] TransportError),
}

impl ControlError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Transport(e) => e.kind(),
        }
    }
}

/// Compute the full next state for `mutation`.
///
/// An explicit mode always wins. Without one, touching either pump forces
/// `Manual`; a mutation that touches nothing keeps the current mode.
pub fn merge(current: &ControlState, mutation: &ControlMutation) -> ControlState {
    let irrigation_mode = match mutation.irrigation_mode {
        Some(mode) => mode,
        None if mutation.touches_pump() => IrrigationMode::Manual,
        None => current.irrigation_mode,
    };

    ControlState {
        irrigation_mode,
        pump_river: mutation.pump_river.unwrap_or(current.pump_river),
        pump_farmland: mutation.pump_farmland.unwrap_or(current.pump_farmland),
    }
}

#[derive(Debug, Default)]
struct Tracked {
    /// Last state the controller confirmed.
    acknowledged: ControlState,
    /// Optimistic state of the mutation in flight.
    pending: Option<ControlState>,
    /// Accepted mutations waiting for their turn, in call order.
    queued: Vec<(u64, ControlMutation)>,
    next_ticket: u64,
}

impl Tracked {
    fn displayed(&self) -> ControlState {
        let base = self.pending.unwrap_or(self.acknowledged);
        self.queued.iter().fold(base, |state, (_, m)| merge(&state, m))
    }

    fn dequeue(&mut self, ticket: u64) {
        self.queued.retain(|(t, _)| *t != ticket);
    }
}

/// Sends control mutations with optimistic local state.
///
/// One mutation is in flight per dispatcher; further `apply` calls wait their
/// turn in call order. Cheap to clone; clones share state and queue.
#[derive(Clone)]
pub struct ControlDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    device: Arc<dyn DeviceApi>,
    state: Mutex<Tracked>,
    /// FIFO: tokio's mutex grants the lock in request order.
    turn: tokio::sync::Mutex<()>,
}

impl ControlDispatcher {
    pub fn new(device: Arc<dyn DeviceApi>, initial: ControlState) -> Self {
        Self {
            inner: Arc::new(Inner {
                device,
                state: Mutex::new(Tracked {
                    acknowledged: initial,
                    ..Default::default()
                }),
                turn: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// What a display should show: the acknowledged state with the mutation
    /// in flight and every queued one merged on top, in call order.
    pub fn current(&self) -> ControlState {
        self.tracked().displayed()
    }

    pub fn acknowledged(&self) -> ControlState {
        self.tracked().acknowledged
    }

    /// Some accepted mutation is not yet confirmed.
    pub fn is_pending(&self) -> bool {
        let t = self.tracked();
        t.pending.is_some() || !t.queued.is_empty()
    }

    /// Reload the acknowledged state from the controller, after any mutation
    /// already in flight.
    pub async fn refresh(&self) -> Result<ControlState, ControlError> {
        let _turn = self.inner.turn.lock().await;
        let state = self.inner.device.fetch_control().await?;
        self.tracked().acknowledged = state;
        info!(
            mode = %state.irrigation_mode,
            pump_river = state.pump_river,
            pump_farmland = state.pump_farmland,
            "Control state loaded from controller"
        );
        Ok(state)
    }

    /// Merge, show optimistically, send, then confirm or roll back.
    ///
    /// The mutation shows in `current()` as soon as it is accepted, even
    /// while queued behind another one. When its turn comes it is merged
    /// onto the acknowledged state at that point. Failures are not retried.
    pub async fn apply(&self, mutation: ControlMutation) -> Result<ControlState, ControlError> {
        let ticket = {
            let mut t = self.tracked();
            let ticket = t.next_ticket;
            t.next_ticket += 1;
            t.queued.push((ticket, mutation));
            ticket
        };
        // Drops the queue entry if the caller goes away while waiting.
        let _queued = QueuedGuard {
            state: &self.inner.state,
            ticket,
        };

        let _turn = self.inner.turn.lock().await;

        let next = {
            let mut t = self.tracked();
            t.dequeue(ticket);
            let next = merge(&t.acknowledged, &mutation);
            t.pending = Some(next);
            next
        };
        // Clears `pending` however this future ends, dropped callers included.
        let pending = PendingGuard { state: &self.inner.state };

        debug!(
            mode = %next.irrigation_mode,
            pump_river = next.pump_river,
            pump_farmland = next.pump_farmland,
            "Sending control update"
        );

        match self.inner.device.send_control(&next).await {
            Ok(confirmed) => {
                pending.confirm(confirmed);
                info!(
                    mode = %confirmed.irrigation_mode,
                    pump_river = confirmed.pump_river,
                    pump_farmland = confirmed.pump_farmland,
                    "Control update acknowledged"
                );
                Ok(confirmed)
            }
            Err(e) => {
                drop(pending);
                warn!(error = %e, "Control update failed; reverted to acknowledged state");
                Err(e.into())
            }
        }
    }

    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        lock(&self.inner.state)
    }
}

fn lock(state: &Mutex<Tracked>) -> MutexGuard<'_, Tracked> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingGuard<'a> {
    state: &'a Mutex<Tracked>,
}

impl PendingGuard<'_> {
    fn confirm(self, confirmed: ControlState) {
        lock(self.state).acknowledged = confirmed;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).pending = None;
    }
}

struct QueuedGuard<'a> {
    state: &'a Mutex<Tracked>,
    ticket: u64,
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).dequeue(self.ticket);
    }
}
