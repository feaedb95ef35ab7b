//! Handle allocation for sessions.

use super::types::Handle;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues session handles from a monotonically increasing counter.
///
/// Handles are never reused, so a stale handle cannot alias a newer session.
/// Zero marks the counter as exhausted.
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first handle is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next handle.
    ///
    /// Returns `None` once the handle space is exhausted.
    pub fn allocate(&self) -> Option<Handle> {
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n != 0).then(|| n.wrapping_add(1))
            })
            .ok()
            .and_then(Handle::from_raw)
    }

    /// Number of handles handed out so far.
    pub fn issued_count(&self) -> u64 {
        match self.next.load(Ordering::Relaxed) {
            0 => u64::MAX,
            n => n - 1,
        }
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_allocate_is_monotonic() {
        let allocator = HandleAllocator::new();
        assert_eq!(allocator.allocate().map(Handle::get), Some(1));
        assert_eq!(allocator.allocate().map(Handle::get), Some(2));
        assert_eq!(allocator.allocate().map(Handle::get), Some(3));
        assert_eq!(allocator.issued_count(), 3);
    }

    #[test]
    fn test_exhaustion() {
        let allocator = HandleAllocator::starting_at(u64::MAX - 1);
        assert_eq!(allocator.allocate().map(Handle::get), Some(u64::MAX - 1));
        assert_eq!(allocator.allocate().map(Handle::get), Some(u64::MAX));
        assert_eq!(allocator.allocate(), None);
        // Stays exhausted rather than wrapping back to 1.
        assert_eq!(allocator.allocate(), None);
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let allocator = Arc::new(HandleAllocator::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let a = allocator.clone();
                std::thread::spawn(move || {
                    (0..500).filter_map(|_| a.allocate()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for t in threads {
            for h in t.join().unwrap() {
                assert!(seen.insert(h), "duplicate handle {h}");
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(allocator.issued_count(), 4000);
    }
}
