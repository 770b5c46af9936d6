//! Counting admission gate for fetch tasks.
//!
//! Wraps a Tokio semaphore so that at most `max_concurrent` tasks are past the
//! gate at once. Tasks are created eagerly and park on [`AdmissionGate::acquire`]
//! until a slot frees; the slot is released when the returned permit drops.
//!
//! ```ignore
//! let gate = Arc::new(AdmissionGate::new(8));
//!
//! let _permit = gate.acquire().await?;
//! // cache check + upstream fetch happen here
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-backed gate with in-flight and peak counters.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl AdmissionGate {
    /// Create a gate admitting `max_concurrent` tasks (at least one).
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: max_concurrent,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Wait for a slot.
    ///
    /// Returns `None` once the gate has been closed; tasks still waiting at
    /// that point are never admitted.
    pub async fn acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        Some(AdmissionPermit {
            _permit: permit,
            gate: Arc::clone(self),
        })
    }

    /// Stop admitting tasks. Already admitted tasks keep their slots.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_permits
    }

    /// Tasks currently past the gate.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed past the gate at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// A held slot; dropping it readmits one waiting task.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
