//! State and listener bookkeeping shared by both unit variants.
//!
//! Locks are never held while user handlers run, so handlers may call back
//! into the unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

use super::state::PlaybackState;
use super::{ErrorHandler, EventHandler, FinishHandler, UnitEvent};
use crate::error::AdError;
use crate::model::{Chain, TrackingEvent, TrackingEventKind};
use crate::obs;
use crate::options::UnitOptions;

/// Native acknowledgments a unit waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Ack {
    Loaded,
    Started,
    Stopped,
    Playing,
}

pub(crate) struct UnitCore {
    chain: Chain,
    options: UnitOptions,
    state: Mutex<PlaybackState>,
    started: AtomicBool,
    error: Mutex<Option<AdError>>,
    listeners: Mutex<Vec<EventHandler>>,
    finish_handlers: Mutex<Vec<FinishHandler>>,
    error_handlers: Mutex<Vec<ErrorHandler>>,
    waiters: Mutex<HashMap<Ack, Vec<oneshot::Sender<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UnitCore {
    pub(crate) fn new(chain: Chain, options: UnitOptions) -> Self {
        Self {
            chain,
            options,
            state: Mutex::new(PlaybackState::Idle),
            started: AtomicBool::new(false),
            error: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            finish_handlers: Mutex::new(Vec::new()),
            error_handlers: Mutex::new(Vec::new()),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn chain(&self) -> &Chain {
        &self.chain
    }

    pub(crate) fn options(&self) -> &UnitOptions {
        &self.options
    }

    pub(crate) fn state(&self) -> PlaybackState {
        *lock(&self.state)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// The single guarded transition. Returns whether the move happened.
    ///
    /// Entering `Finished` wakes every pending acknowledgment waiter and
    /// runs the finish handlers exactly once.
    pub(crate) fn transition(&self, to: PlaybackState) -> bool {
        let from = {
            let mut state = lock(&self.state);
            if !state.can_transition(to) {
                return false;
            }
            std::mem::replace(&mut *state, to)
        };
        obs::emit_unit_transition(from.as_str(), to.as_str());

        match to {
            PlaybackState::Started => self.started.store(true, Ordering::SeqCst),
            PlaybackState::Finished => {
                lock(&self.waiters).clear();
                let handlers = std::mem::take(&mut *lock(&self.finish_handlers));
                for handler in handlers {
                    handler();
                }
            }
            _ => {}
        }
        true
    }

    pub(crate) fn finish(&self) -> bool {
        self.transition(PlaybackState::Finished)
    }

    /// Register interest in `ack` before triggering the call that sends it.
    pub(crate) fn waiter(&self, ack: Ack) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.waiters).entry(ack).or_default().push(tx);
        rx
    }

    pub(crate) fn acknowledge(&self, ack: Ack) {
        let senders = lock(&self.waiters).remove(&ack).unwrap_or_default();
        for tx in senders {
            let _ = tx.send(());
        }
    }

    /// Wait up to `bound` for an acknowledgment. `false` on timeout or when
    /// the unit finished first.
    pub(crate) async fn wait(&self, rx: oneshot::Receiver<()>, bound: Duration) -> bool {
        matches!(tokio::time::timeout(bound, rx).await, Ok(Ok(())))
    }

    pub(crate) fn emit(&self, kind: TrackingEventKind) {
        self.emit_event(UnitEvent::Tracking(TrackingEvent::new(kind)));
    }

    pub(crate) fn emit_with(&self, kind: TrackingEventKind, payload: serde_json::Value) {
        self.emit_event(UnitEvent::Tracking(TrackingEvent::with_payload(kind, payload)));
    }

    pub(crate) fn emit_event(&self, event: UnitEvent) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Store `error`, emit the `error` tracking event and notify error
    /// handlers. Does not finish the unit.
    pub(crate) fn report_error(&self, error: AdError) {
        tracing::warn!(event = "unit.error", code = ?error.code, message = %error.message);
        *lock(&self.error) = Some(error.clone());
        self.emit_with(
            TrackingEventKind::Error,
            serde_json::json!({ "code": error.code, "message": error.message }),
        );
        let handlers = lock(&self.error_handlers).clone();
        for handler in handlers {
            handler(&error);
        }
    }

    pub(crate) fn error(&self) -> Option<AdError> {
        lock(&self.error).clone()
    }

    pub(crate) fn on_event(&self, handler: EventHandler) {
        lock(&self.listeners).push(handler);
    }

    pub(crate) fn on_finish(&self, handler: FinishHandler) {
        lock(&self.finish_handlers).push(handler);
    }

    pub(crate) fn on_error(&self, handler: ErrorHandler) {
        lock(&self.error_handlers).push(handler);
    }
}

/// Clamp a native time reading: negative, NaN and infinite become zero.
pub(crate) fn clamp_time(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
