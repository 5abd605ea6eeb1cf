use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by every `subscribe` in this crate; pass it back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Monotonic id source; ids are unique per source. Host implementations of
/// the subscribable traits use one to mint their ids.
#[derive(Debug, Default)]
pub struct SubscriptionIds {
    next: AtomicU64,
}

impl SubscriptionIds {
    pub fn next(&self) -> SubscriptionId {
        SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
