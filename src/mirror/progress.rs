//! Byte accounting for a run and its transfer units.

use super::RunShared;
use crate::export::TransferObserver;
use crate::types::{Event, ItemId, TransferState, TransferUpdate};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Run-wide byte counters
///
/// Both counters only grow. `known` is refined as folders are resolved and
/// when a retried export discards bytes it had already counted.
#[derive(Debug, Default)]
pub(crate) struct RunProgress {
    processed: AtomicU64,
    known: AtomicU64,
    /// Serializes publication so receivers see counter values in order
    publish_lock: Mutex<()>,
}

impl RunProgress {
    pub(crate) fn add_processed(&self, bytes: u64) {
        self.processed.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn add_known(&self, bytes: u64) {
        self.known.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub(crate) fn known(&self) -> u64 {
        self.known.load(Ordering::SeqCst)
    }

    pub(crate) fn fraction(&self) -> f64 {
        fraction_of(self.processed(), self.known())
    }

    pub(crate) fn publish(&self, event_tx: &broadcast::Sender<Event>) {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let bytes_processed = self.processed();
        let bytes_known = self.known();
        event_tx
            .send(Event::Progress {
                fraction: fraction_of(bytes_processed, bytes_known),
                bytes_processed,
                bytes_known,
            })
            .ok();
    }
}

fn fraction_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        return if done > 0 { 1.0 } else { 0.0 };
    }
    (done as f64 / total as f64).clamp(0.0, 1.0)
}

#[derive(Debug)]
struct HandleState {
    state: TransferState,
    message: String,
    fraction: f64,
    /// Set once the exporter reports fractions itself (composite exports)
    explicit_fraction: bool,
    last_percent: u8,
}

/// Live view of one transfer unit
#[derive(Debug)]
pub struct TransferHandle {
    item_id: ItemId,
    name: String,
    bytes_total: u64,
    bytes_done: AtomicU64,
    inner: Mutex<HandleState>,
}

impl TransferHandle {
    pub(crate) fn new(item_id: ItemId, name: String, bytes_total: u64) -> Self {
        Self {
            item_id,
            name,
            bytes_total,
            bytes_done: AtomicU64::new(0),
            inner: Mutex::new(HandleState {
                state: TransferState::Queued,
                message: "queued".to_string(),
                fraction: 0.0,
                explicit_fraction: false,
                last_percent: 0,
            }),
        }
    }

    /// Item being transferred
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Final local name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.lock().state
    }

    /// Point-in-time copy of the unit's progress
    pub fn snapshot(&self) -> TransferUpdate {
        let inner = self.lock();
        TransferUpdate {
            item_id: self.item_id.clone(),
            name: self.name.clone(),
            bytes_done: self.bytes_done.load(Ordering::SeqCst),
            bytes_total: self.bytes_total,
            fraction: inner.fraction,
            state: inner.state,
            message: inner.message.clone(),
        }
    }

    pub(crate) fn set_state(&self, state: TransferState, message: impl Into<String>) {
        let mut inner = self.lock();
        inner.state = state;
        inner.message = message.into();
        if state == TransferState::Succeeded {
            inner.fraction = 1.0;
        }
    }

    pub(crate) fn set_message(&self, message: impl Into<String>) {
        self.lock().message = message.into();
    }

    pub(crate) fn set_fraction(&self, fraction: f64) {
        let mut inner = self.lock();
        inner.explicit_fraction = true;
        inner.fraction = fraction.clamp(0.0, 1.0);
    }

    /// Count written bytes; true when the visible percentage changed
    pub(crate) fn add_bytes(&self, bytes: u64) -> bool {
        let done = self.bytes_done.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let mut inner = self.lock();
        if inner.explicit_fraction || self.bytes_total == 0 {
            return false;
        }

        inner.fraction = fraction_of(done, self.bytes_total);
        let percent = (inner.fraction * 100.0) as u8;
        if percent == inner.last_percent {
            return false;
        }
        inner.last_percent = percent;
        inner.message = format!("downloading: {}%", percent);
        true
    }

    pub(crate) fn reset_bytes(&self) {
        self.bytes_done.store(0, Ordering::SeqCst);
        let mut inner = self.lock();
        if !inner.explicit_fraction {
            inner.fraction = 0.0;
            inner.last_percent = 0;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Routes one unit's export callbacks into its handle and the run counters
pub(crate) struct UnitProgress {
    pub(crate) shared: Arc<RunShared>,
    pub(crate) handle: Arc<TransferHandle>,
}

impl UnitProgress {
    pub(crate) fn emit_update(&self) {
        self.shared.emit(Event::Transfer(self.handle.snapshot()));
    }
}

impl TransferObserver for UnitProgress {
    fn on_bytes(&self, bytes: u64) {
        self.shared.progress.add_processed(bytes);
        self.shared.publish_progress();
        if self.handle.add_bytes(bytes) {
            self.emit_update();
        }
    }

    fn on_rewind(&self, discarded: u64) {
        // The run counter stays monotonic; the retry's bytes are new work
        self.shared.progress.add_known(discarded);
        self.handle.reset_bytes();
        self.shared.publish_progress();
    }

    fn on_phase(&self, phase: &str) {
        self.handle.set_message(phase);
        self.emit_update();
    }

    fn on_fraction(&self, fraction: f64) {
        self.handle.set_fraction(fraction);
        self.emit_update();
    }

    fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}
