//! Collection gate and cooldown timers
//!
//! A capture session only accepts frames while its gate is open. Between two
//! samples the gate is closed and a background timer re-opens it after the
//! configured cooldown, giving the signer time to reset their pose. Timers are
//! cancelled when dropped, and a finished gate can never be re-opened.

use crossbeam_channel::{after, bounded, select, Sender};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const GATE_OPEN: u8 = 0;
const GATE_CLOSED: u8 = 1;
const GATE_FINISHED: u8 = 2;

/// Shared on/off switch for frame collection
#[derive(Debug, Clone)]
pub struct CollectionGate {
    state: Arc<AtomicU8>,
}

impl Default for CollectionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(GATE_OPEN)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == GATE_OPEN
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == GATE_FINISHED
    }

    /// Open the gate; returns false if the session has already finished
    pub fn open(&self) -> bool {
        match self.state.compare_exchange(
            GATE_CLOSED,
            GATE_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => current == GATE_OPEN,
        }
    }

    /// Close the gate unless it has finished
    pub fn close(&self) {
        let _ = self.state.compare_exchange(
            GATE_OPEN,
            GATE_CLOSED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Close the gate for good
    pub fn finish(&self) {
        self.state.store(GATE_FINISHED, Ordering::Release);
    }
}

/// Background timer that re-opens a gate after a delay
pub struct CooldownTimer {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CooldownTimer {
    /// Start a timer that opens `gate` after `delay`
    pub fn schedule(gate: CollectionGate, delay: Duration) -> Self {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        let handle = thread::spawn(move || {
            let deadline = after(delay);
            select! {
                // Fires on an explicit cancel and when the timer is dropped
                recv(cancel_rx) -> _ => {
                    log::debug!("cooldown cancelled");
                }
                recv(deadline) -> _ => {
                    if gate.open() {
                        log::debug!("collection resumed after {:?}", delay);
                    }
                }
            }
        });

        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Whether the timer thread has exited (fired or cancelled)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancel the timer and wait for its thread to exit
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CooldownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Holds at most one pending cooldown for a session
#[derive(Default)]
pub struct CooldownScheduler {
    pending: Option<CooldownTimer>,
}

impl CooldownScheduler {
    /// Close `gate` and re-open it after `delay`, replacing any pending timer
    pub fn pause(&mut self, gate: &CollectionGate, delay: Duration) {
        self.cancel();
        gate.close();
        self.pending = Some(CooldownTimer::schedule(gate.clone(), delay));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Cancel the pending timer, if any
    pub fn cancel(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.cancel();
        }
    }
}
