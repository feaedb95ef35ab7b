//! Process-wide task counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Submitted/completed tallies for push and poll tasks across all sessions.
///
/// `submitted` moves once a task is accepted into a queue; `completed` once
/// the worker has run it, successfully or not. Cancelled tasks never
/// complete, so `submitted - completed` is the number in flight or dropped.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    push_submitted: AtomicU64,
    push_completed: AtomicU64,
    poll_submitted: AtomicU64,
    poll_completed: AtomicU64,
}

impl Counters {
    pub fn record_push_submitted(&self) {
        self.push_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push_completed(&self) {
        self.push_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_submitted(&self) {
        self.poll_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_completed(&self) {
        self.poll_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            push_submitted: self.push_submitted.load(Ordering::Relaxed),
            push_completed: self.push_completed.load(Ordering::Relaxed),
            poll_submitted: self.poll_submitted.load(Ordering::Relaxed),
            poll_completed: self.poll_completed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub push_submitted: u64,
    pub push_completed: u64,
    pub poll_submitted: u64,
    pub poll_completed: u64,
}

impl CounterSnapshot {
    /// Push tasks accepted but not (yet) run.
    pub fn push_pending(&self) -> u64 {
        self.push_submitted.saturating_sub(self.push_completed)
    }

    /// Poll tasks accepted but not (yet) run.
    pub fn poll_pending(&self) -> u64 {
        self.poll_submitted.saturating_sub(self.poll_completed)
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatch::counters::Counters;
    use std::sync::Arc;

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(Counters::default());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let c = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.record_push_submitted();
                        c.record_poll_submitted();
                        c.record_push_completed();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        let snap = counters.snapshot();
        assert_eq!(snap.push_submitted, 8000);
        assert_eq!(snap.push_completed, 8000);
        assert_eq!(snap.poll_submitted, 8000);
        assert_eq!(snap.poll_completed, 0);
        assert_eq!(snap.push_pending(), 0);
        assert_eq!(snap.poll_pending(), 8000);
    }

    #[test]
    fn snapshot_serializes_snake_case() {
        let counters = Counters::default();
        counters.record_poll_submitted();
        let json = serde_json::to_value(counters.snapshot()).unwrap();
        assert_eq!(json["poll_submitted"], 1);
        assert_eq!(json["push_completed"], 0);
    }
}
