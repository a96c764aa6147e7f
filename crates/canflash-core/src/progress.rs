//! Upload progress shared between the upload thread and its observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Progress percentage (0.0 to 100.0) stored as `f64` bits in an atomic.
///
/// One writer (the transfer loop), any number of readers. Readers may see the
/// default 0.0 before a transfer starts.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    bits: Arc<AtomicU64>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress in percent.
    pub fn percent(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0);
        self.bits.store(clamped.to_bits(), Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.set(0.0);
    }
}
