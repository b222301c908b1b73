use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Value the controller keeps at the front of the slot while the tracker
/// should keep running.
pub const KEEP_RUNNING: i64 = 2;

/// Polled once per frame by the frame loop; never pushes.
pub trait ShutdownSignal {
    fn stop_requested(&self) -> bool;
}

/// Shared queue whose first element is compared against a keep-running
/// sentinel. Clones share the same slot, so a controller thread can hold
/// one handle and the frame loop another.
#[derive(Debug, Clone)]
pub struct SharedSlot {
    slot: Arc<Mutex<VecDeque<i64>>>,
    keep_running: i64,
}

impl SharedSlot {
    /// A slot holding [`KEEP_RUNNING`].
    pub fn new() -> Self {
        Self::with_sentinel(KEEP_RUNNING)
    }

    pub fn with_sentinel(keep_running: i64) -> Self {
        Self {
            slot: Arc::new(Mutex::new(VecDeque::from([keep_running]))),
            keep_running,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<i64>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the first element.
    pub fn set(&self, value: i64) {
        let mut slot = self.lock();
        match slot.front_mut() {
            Some(front) => *front = value,
            None => slot.push_back(value),
        }
    }

    /// Queue a value behind the current front.
    pub fn push(&self, value: i64) {
        self.lock().push_back(value);
    }

    /// Drop the first element, promoting the next queued value.
    pub fn pop(&self) -> Option<i64> {
        self.lock().pop_front()
    }

    /// Put a stop value at the front of the slot.
    pub fn request_stop(&self) {
        self.set(self.keep_running.wrapping_add(1));
    }

    pub fn front(&self) -> Option<i64> {
        self.lock().front().copied()
    }
}

impl Default for SharedSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal for SharedSlot {
    /// An empty slot means nobody asked to stop.
    fn stop_requested(&self) -> bool {
        self.front().is_some_and(|front| front != self.keep_running)
    }
}

/// A signal that never fires.
pub struct NeverStop;

impl ShutdownSignal for NeverStop {
    fn stop_requested(&self) -> bool {
        false
    }
}
