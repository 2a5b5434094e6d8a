use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{FailureTableError, Result};
use crate::key::Key;
use crate::peer::WeakPeerHandle;
use crate::table::FailureTable;
use crate::transport::ClientQueue;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// A single received offer (spec §3, component C2).
#[derive(Clone)]
pub struct OfferRecord {
    pub offered_time: Instant,
    pub peer: WeakPeerHandle,
    pub authenticator: [u8; 32],
    pub boot_id: u64,
    seq: u64,
}

impl OfferRecord {
    pub fn new(offered_time: Instant, peer: WeakPeerHandle, authenticator: [u8; 32], boot_id: u64) -> Self {
        Self {
            offered_time,
            peer,
            authenticator,
            boot_id,
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn expired(&self, now: Instant, offer_expiry: Duration) -> bool {
        now > self.offered_time + offer_expiry
    }
}

/// Per-key list of received offers (spec §3).
///
/// Empty sets must be removed from the owning index; this type only tracks its
/// own contents, the index-level removal is the coordinator's job (it's the one
/// holding the coarse lock that protects the index).
pub struct OfferSet {
    key: Key,
    offers: Mutex<Vec<OfferRecord>>,
}

impl OfferSet {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            offers: Mutex::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn push(&self, record: OfferRecord) {
        self.offers.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.offers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.lock().is_empty()
    }

    fn remove_seq(&self, seq: u64) -> Option<OfferRecord> {
        let mut g = self.offers.lock();
        let pos = g.iter().position(|r| r.seq == seq)?;
        Some(g.remove(pos))
    }

    /// Drops expired records. Returns true if anything changed.
    pub fn cleanup(&self, now: Instant, offer_expiry: Duration) -> bool {
        let mut g = self.offers.lock();
        let before = g.len();
        g.retain(|r| !r.expired(now, offer_expiry));
        before != g.len()
    }

    /// A snapshot split into (recent, expired), for building an `OfferIterator`.
    fn snapshot(&self, now: Instant, offer_expiry: Duration) -> (Vec<OfferRecord>, Vec<OfferRecord>) {
        let g = self.offers.lock();
        let mut recent = Vec::new();
        let mut expired = Vec::new();
        for r in g.iter() {
            if r.expired(now, offer_expiry) {
                expired.push(r.clone());
            } else {
                recent.push(r.clone());
            }
        }
        (recent, expired)
    }
}

/// Picks a uniformly random index in `[0, len)`. Injected so `OfferIterator`'s
/// selection is deterministic in tests (spec §9).
pub trait RandomSource: Send + Sync {
    fn pick_index(&self, len: usize) -> usize;
}

#[derive(Debug, Default)]
pub struct ThreadRandomSource;

impl RandomSource for ThreadRandomSource {
    fn pick_index(&self, len: usize) -> usize {
        use rand::Rng;
        rand::rng().random_range(0..len)
    }
}

struct PendingOffer {
    seq: u64,
}

/// Iterator over current offers for a key (spec §4.1 `get_offers`).
///
/// Partitions offers into `recent` (not expired at snapshot time) and `expired`.
/// `next_offer()` returns a uniformly random member of `recent` first, then of
/// `expired`, mitigating traffic analysis by not preferring any particular
/// offer. After it returns `Some`, exactly one of `accept_last()`/`keep_last()`
/// must be called before the next `next_offer()` - calling `next_offer()` again
/// first is a programmer error (`FailureTableError::IllegalState`).
pub struct OfferIterator {
    set: Arc<OfferSet>,
    key: Key,
    recent: Vec<OfferRecord>,
    expired: Vec<OfferRecord>,
    pending: Option<PendingOffer>,
    rng: Arc<dyn RandomSource>,
    table: Weak<FailureTable>,
    client_queue: Arc<dyn ClientQueue>,
}

impl OfferIterator {
    pub(crate) fn new(
        set: Arc<OfferSet>,
        now: Instant,
        offer_expiry: Duration,
        rng: Arc<dyn RandomSource>,
        table: Weak<FailureTable>,
        client_queue: Arc<dyn ClientQueue>,
    ) -> Self {
        let key = *set.key();
        let (recent, expired) = set.snapshot(now, offer_expiry);
        Self {
            set,
            key,
            recent,
            expired,
            pending: None,
            rng,
            table,
            client_queue,
        }
    }

    pub fn next_offer(&mut self) -> Result<Option<OfferRecord>> {
        if self.pending.is_some() {
            return Err(FailureTableError::IllegalState);
        }
        let bucket = if !self.recent.is_empty() {
            &mut self.recent
        } else if !self.expired.is_empty() {
            &mut self.expired
        } else {
            return Ok(None);
        };
        let idx = self.rng.pick_index(bucket.len());
        let record = bucket.remove(idx);
        self.pending = Some(PendingOffer { seq: record.seq });
        Ok(Some(record))
    }

    /// The offer was used: delete it from the underlying `OfferSet`. If that
    /// was the last record, the now-empty `OfferSet` is eagerly dropped from
    /// the table's index and the client layer is notified via
    /// `dequeue_offered_key`, rather than waiting for the next cleaner sweep
    /// (spec.md §6: "`dequeue_offered_key(key)` on OfferSet removal").
    pub fn accept_last(&mut self) -> Result<()> {
        let pending = self.pending.take().ok_or(FailureTableError::IllegalState)?;
        self.set.remove_seq(pending.seq);

        if self.set.is_empty() {
            if let Some(table) = self.table.upgrade() {
                let removed = {
                    let mut inner = table.inner.lock();
                    let still_current = inner.offers.get(&self.key).is_some_and(|s| Arc::ptr_eq(s, &self.set));
                    if still_current {
                        inner.offers.remove(&self.key);
                    }
                    still_current
                };
                if removed {
                    self.client_queue.dequeue_offered_key(&self.key);
                }
            }
        }
        Ok(())
    }

    /// The offer was not used: leave it in the underlying `OfferSet` for future
    /// iterations. No-op on the set itself, since `next_offer()` already removed
    /// it only from *this iterator's* working set, not the set proper.
    pub fn keep_last(&mut self) -> Result<()> {
        self.pending.take().ok_or(FailureTableError::IllegalState)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerHandle;
    use crate::transport::NullClientQueue;

    struct FixedRandomSource(usize);
    impl RandomSource for FixedRandomSource {
        fn pick_index(&self, len: usize) -> usize {
            self.0 % len
        }
    }

    fn make_record(offered_time: Instant) -> OfferRecord {
        let p = PeerHandle::new(1, 0);
        OfferRecord::new(offered_time, p.downgrade(), [0u8; 32], 0)
    }

    /// No backing `FailureTable` in these unit tests: `table` is a dangling
    /// `Weak`, so `accept_last` exercises only the `OfferSet`-local deletion,
    /// not the index-eviction/`dequeue_offered_key` side effect. That side
    /// effect is covered at the `FailureTable` level in `src/tests/scenarios.rs`.
    fn new_iterator(set: Arc<OfferSet>, now: Instant, offer_expiry: Duration, rng: Arc<dyn RandomSource>) -> OfferIterator {
        OfferIterator::new(set, now, offer_expiry, rng, Weak::new(), Arc::new(NullClientQueue))
    }

    #[test]
    fn next_offer_requires_ack_before_reuse() {
        let set = Arc::new(OfferSet::new(Key::chk([0u8; 32])));
        set.push(make_record(Instant::now()));
        let mut it = new_iterator(set, Instant::now(), Duration::from_secs(600), Arc::new(FixedRandomSource(0)));
        assert!(it.next_offer().unwrap().is_some());
        assert!(matches!(it.next_offer(), Err(FailureTableError::IllegalState)));
        it.accept_last().unwrap();
    }

    #[test]
    fn accept_last_deletes_keep_last_preserves() {
        let set = Arc::new(OfferSet::new(Key::chk([0u8; 32])));
        set.push(make_record(Instant::now()));
        let mut it = new_iterator(set.clone(), Instant::now(), Duration::from_secs(600), Arc::new(FixedRandomSource(0)));
        let offer = it.next_offer().unwrap().unwrap();
        let _ = offer;
        it.keep_last().unwrap();
        assert_eq!(set.len(), 1, "keep_last must not delete the offer");

        let mut it2 = new_iterator(set.clone(), Instant::now(), Duration::from_secs(600), Arc::new(FixedRandomSource(0)));
        it2.next_offer().unwrap();
        it2.accept_last().unwrap();
        assert_eq!(set.len(), 0, "accept_last must delete the offer");
    }

    #[test]
    fn recent_drained_before_expired() {
        let now = Instant::now();
        let set = Arc::new(OfferSet::new(Key::chk([0u8; 32])));
        set.push(make_record(now - Duration::from_secs(3600))); // expired
        set.push(make_record(now)); // recent
        let mut it = new_iterator(set, now, Duration::from_secs(600), Arc::new(FixedRandomSource(0)));

        let first = it.next_offer().unwrap().unwrap();
        assert!(!first.expired(now, Duration::from_secs(600)));
        it.accept_last().unwrap();

        let second = it.next_offer().unwrap().unwrap();
        assert!(second.expired(now, Duration::from_secs(600)));
        it.accept_last().unwrap();

        assert!(it.next_offer().unwrap().is_none());
    }
}
