use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Process-wide logical clock of a store.
///
/// Every mutation takes the next value, which becomes that mutation's
/// timestamp. Values are strictly increasing across all keys.
#[derive(Debug, Default)]
pub struct IndexAllocator {
    last: AtomicU64,
}

impl IndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next index
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last allocated index (0 before the first mutation)
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
