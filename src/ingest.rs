//! Bounded sample ingest buffer.
//!
//! Sits in front of the sessions for producers that deliver one sample at a
//! time (sensor callbacks, UI timers): they append here and a consumer drains
//! batches into [`SessionManager::push`](crate::SessionManager::push).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Most recent samples retained.
pub const INGEST_CAPACITY: usize = 300;
/// Largest batch a single drain returns.
pub const MAX_DRAIN: usize = 1000;

pub struct SampleBuffer {
    samples: Mutex<VecDeque<f64>>,
    capacity: usize,
    /// f64 bits of the last confidence.
    confidence: AtomicU64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INGEST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            confidence: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Append one sample, evicting the oldest when full. Non-finite values
    /// are ignored.
    pub fn add_sample(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    /// Remove and return up to [`MAX_DRAIN`] samples, oldest first.
    pub fn drain(&self) -> Vec<f64> {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let n = samples.len().min(MAX_DRAIN);
        samples.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a confidence reading, clamped to [0, 1]. Non-finite values are
    /// ignored.
    pub fn set_confidence(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.confidence
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn confidence(&self) -> f64 {
        f64::from_bits(self.confidence.load(Ordering::Relaxed))
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
