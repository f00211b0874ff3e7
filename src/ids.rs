//! Monotonic id issuance for points and segments.
//!
//! A process-local atomic counter per id kind. Ids are strictly
//! increasing in the total order of `next()` calls. The counter itself
//! is not durable; [`crate::graph::HybridStore::open`] advances it past
//! every id already present in the metadata store, so a restarted
//! process never re-issues a live id.

use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct IdAllocator {
    last: AtomicI64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id. Strictly increasing within the process.
    pub fn next(&self) -> i64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Raise the floor so no future id is `<= observed`. Used during
    /// the boot scan; safe to call with ids in any order.
    pub fn advance_past(&self, observed: i64) {
        self.last.fetch_max(observed, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn ids_are_strictly_increasing() {
        let ids = IdAllocator::new();
        let mut prev = 0;
        for _ in 0..100 {
            let id = ids.next();
            assert!(id > prev);
            prev = id;
        }
    }

    #[test]
    fn advance_past_raises_the_floor() {
        let ids = IdAllocator::new();
        ids.advance_past(41);
        ids.advance_past(7);
        assert_eq!(ids.next(), 42);
    }

    #[test]
    fn concurrent_allocation_never_duplicates() {
        let ids = Arc::new(IdAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ids = ids.clone();
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| ids.next()).collect::<Vec<i64>>()
            }));
        }
        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8000);
    }
}
