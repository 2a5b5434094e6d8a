use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of "now" for the table.
///
/// Spec §9 calls for the random source used by `OfferIterator` to be injected so
/// tests are deterministic; the same reasoning applies to time, since scenarios
/// like offer expiry (S5) need to advance the clock without a real `sleep`. The
/// default implementation is a thin wrapper over `Instant::now()`, the way the rest
/// of the codebase reads time directly (`peer_stats.rs`'s `PeerConnectionStats`).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually-advanced clock for tests. Starts at `Instant::now()` at construction
/// and is moved forward explicitly with `advance`.
pub struct TestClock {
    base: Instant,
    offset_millis: AtomicU64,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_millis: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.offset_millis
            .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}
