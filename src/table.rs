use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::block::Block;
use crate::clock::Clock;
use crate::config::FailureTableConfig;
use crate::entry::{Entry, RoutedToView};
use crate::key::Key;
use crate::lru_index::LruIndex;
use crate::offer::{OfferIterator, OfferSet, RandomSource, ThreadRandomSource};
use crate::peer::PeerHandle;
use crate::serve::{run_offer_queue, OfferQueueTask};
use crate::spawn_utils::BlockingSpawner;
use crate::transport::{BlockTransmitter, ClientQueue, Datastore, Transport, UidReleaser};

pub(crate) struct FailureTableInner {
    pub(crate) entries: LruIndex<Key, Arc<Entry>>,
    pub(crate) offers: LruIndex<Key, Arc<OfferSet>>,
}

/// Coordinator (spec §4.1, component C4). Owns the two bounded LRU indices and
/// synchronises access to them; Entry/OfferSet objects have their own
/// fine-grained locks for internal mutation. Lock order is always this
/// coordinator's lock first, then an Entry/OfferSet's lock - never the reverse
/// (spec §4.1/§5).
pub struct FailureTable {
    pub(crate) inner: Mutex<FailureTableInner>,
    pub(crate) config: FailureTableConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rng: Arc<dyn RandomSource>,
    /// Process-local HMAC key, randomly generated at construction and
    /// read-only thereafter (spec §3/§9).
    pub(crate) authenticator_key: [u8; 32],
    pub(crate) datastore: Arc<dyn Datastore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) client_queue: Arc<dyn ClientQueue>,
    pub(crate) block_transmitter: Arc<dyn BlockTransmitter>,
    pub(crate) uid_releaser: Arc<dyn UidReleaser>,
    pub(crate) blocking_spawner: BlockingSpawner,
    offer_queue_tx: mpsc::UnboundedSender<OfferQueueTask>,
    /// Weak handle to itself, handed out to `OfferIterator`s returned from
    /// `get_offers` so `accept_last` can evict a now-empty `OfferSet` from the
    /// index without the caller needing to hold an `Arc<FailureTable>`.
    self_weak: Weak<FailureTable>,
}

/// Collaborators a `FailureTable` needs from the rest of the node. All are
/// external interfaces per spec §6 and are trait objects so this crate
/// compiles and tests standalone without a real transport/datastore/peer table.
pub struct FailureTableDeps {
    pub datastore: Arc<dyn Datastore>,
    pub transport: Arc<dyn Transport>,
    pub client_queue: Arc<dyn ClientQueue>,
    pub block_transmitter: Arc<dyn BlockTransmitter>,
    pub uid_releaser: Arc<dyn UidReleaser>,
}

impl FailureTable {
    /// Builds the table and spawns its background workers: the offer serial
    /// queue (C6/C5) and the periodic cleaner (C7). Mirrors how
    /// `Session::new_with_opts` constructs an `Arc<Self>` and then
    /// `session.spawn(...)`s its background tasks.
    pub fn new(config: FailureTableConfig, deps: FailureTableDeps) -> Arc<Self> {
        Self::new_with_clock_and_rng(config, deps, Arc::new(crate::clock::SystemClock), Arc::new(ThreadRandomSource))
    }

    pub fn new_with_clock_and_rng(
        config: FailureTableConfig,
        deps: FailureTableDeps,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
    ) -> Arc<Self> {
        let mut authenticator_key = [0u8; 32];
        rand::rng().fill_bytes(&mut authenticator_key);

        let (offer_queue_tx, offer_queue_rx) = mpsc::unbounded_channel();

        let table = Arc::new_cyclic(|weak_self| Self {
            inner: Mutex::new(FailureTableInner {
                entries: LruIndex::new(config.max_entries),
                offers: LruIndex::new(config.max_offers),
            }),
            config,
            clock,
            rng,
            authenticator_key,
            datastore: deps.datastore,
            transport: deps.transport,
            client_queue: deps.client_queue,
            block_transmitter: deps.block_transmitter,
            uid_releaser: deps.uid_releaser,
            blocking_spawner: BlockingSpawner::default(),
            offer_queue_tx,
            self_weak: weak_self.clone(),
        });

        tokio::spawn(run_offer_queue(table.clone(), offer_queue_rx));
        tokio::spawn(crate::cleaner::run_cleaner(table.clone()));

        table
    }

    fn get_or_create_entry(&self, key: Key) -> Arc<Entry> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let entry = match inner.entries.get(&key) {
            Some(e) => e.clone(),
            None => Arc::new(Entry::new(key, now)),
        };
        if let Some((evicted, _)) = inner.entries.push(key, entry.clone()) {
            trace!(evicted = %evicted, "entries LRU evicted oldest key");
        }
        entry
    }

    /// A routing attempt to `routed_to` failed, but the overall request keeps
    /// going. Creates or refreshes the Entry and records `routed_to` with its
    /// timeout (spec §4.1). Gated by `enable_per_node_failure_tables`.
    pub fn on_failed(&self, key: Key, routed_to: Option<PeerHandle>, htl: u8, timeout: Duration) {
        if !self.config.enable_per_node_failure_tables {
            return;
        }
        trace!(%key, routed_to = ?routed_to.as_ref().map(PeerHandle::id), "on_failed");
        let entry = self.get_or_create_entry(key);
        let now = self.clock.now();
        if let Some(peer) = routed_to {
            entry.failed_to(&peer, timeout, now, htl);
        }
    }

    /// The request terminated in DNF. Same as `on_failed` plus recording
    /// `requestor`, if present (spec §4.1).
    pub fn on_final_failure(
        &self,
        key: Key,
        routed_to: Option<PeerHandle>,
        htl: u8,
        timeout: Duration,
        requestor: Option<PeerHandle>,
    ) {
        if !self.config.enable_per_node_failure_tables {
            return;
        }
        trace!(%key, "on_final_failure");
        let entry = self.get_or_create_entry(key);
        let now = self.clock.now();
        if let Some(peer) = routed_to {
            entry.failed_to(&peer, timeout, now, htl);
        }
        if let Some(req) = requestor {
            entry.add_requestor(&req, now);
        }
    }

    /// The block became locally available. If an Entry exists for `block.key`
    /// it is atomically removed from both indices, then (outside the lock)
    /// `entry.offer()` pushes an outgoing offer to every recorded requestor.
    /// Consuming the Entry here is a privacy requirement, so deletion always
    /// happens even when ULPR propagation is disabled for outgoing offers
    /// (spec §4.1). Removing the `OfferSet` notifies the client layer via
    /// `dequeue_offered_key` (spec §6).
    pub fn on_found(&self, block: Block) -> usize {
        let key = block.key;
        let (entry, offers_removed) = {
            let mut inner = self.inner.lock();
            let entry = inner.entries.remove(&key);
            let offers_removed = inner.offers.remove(&key).is_some();
            (entry, offers_removed)
        };
        if offers_removed {
            self.client_queue.dequeue_offered_key(&key);
        }
        let Some(entry) = entry else {
            return 0;
        };
        debug!(%key, "on_found removed entry from both indices");
        if !self.config.enable_ulpr_propagation {
            return 0;
        }
        entry.offer(&self.authenticator_key, self.transport.as_ref())
    }

    /// An inbound offer notification. The fast-path check happens here, under
    /// the coarse lock: the Entry must exist or we drop silently, since we
    /// never asked for this key. Full validation (disk I/O via `has_key`) is
    /// handed off to the offer serial queue (spec §4.1).
    pub fn on_offer(&self, key: Key, peer: PeerHandle, authenticator: [u8; 32]) {
        if !self.config.enable_ulpr_propagation {
            return;
        }
        let exists = {
            let inner = self.inner.lock();
            inner.entries.get(&key).is_some()
        };
        if !exists {
            trace!(%key, "on_offer: no entry, dropping silently");
            return;
        }
        if self
            .offer_queue_tx
            .send(OfferQueueTask::IncomingOffer {
                key,
                peer,
                authenticator,
            })
            .is_err()
        {
            warn!(%key, "offer queue closed, dropping incoming offer");
        }
    }

    /// A peer wants to download a key we previously offered. Handed off to the
    /// offer serial queue, which is responsible for releasing `uid` on every
    /// exit path (spec §4.4).
    pub fn send_offered_key(&self, key: Key, is_ssk: bool, need_pub_key: bool, uid: u64, source: PeerHandle) {
        if self
            .offer_queue_tx
            .send(OfferQueueTask::SendOfferedKey {
                key,
                is_ssk,
                need_pub_key,
                uid,
                source,
            })
            .is_err()
        {
            warn!(%key, uid, "offer queue closed, releasing uid directly");
            self.uid_releaser.unlock_uid(uid);
        }
    }

    /// Current offers for `key`, or `None` if there are none (spec §4.1
    /// `get_offers`). Gated by `enable_ulpr_propagation`.
    pub fn get_offers(&self, key: &Key) -> Option<OfferIterator> {
        if !self.config.enable_ulpr_propagation {
            return None;
        }
        let set = {
            let inner = self.inner.lock();
            inner.offers.get(key)?.clone()
        };
        if set.is_empty() {
            return None;
        }
        Some(OfferIterator::new(
            set,
            self.clock.now(),
            self.config.offer_expiry,
            self.rng.clone(),
            self.self_weak.clone(),
            self.client_queue.clone(),
        ))
    }

    /// True iff any recorded requestor for `key` is still interested.
    pub fn peers_want_key(&self, key: &Key) -> bool {
        let inner = self.inner.lock();
        inner.entries.get(key).is_some_and(|e| e.peers_want())
    }

    /// Read-only view of routed-to records for `key`, for the routing layer to
    /// avoid re-routing to peers whose timeout hasn't elapsed. Gated by
    /// `enable_per_node_failure_tables`.
    pub fn timed_out_nodes_list(&self, key: &Key) -> Option<Vec<RoutedToView>> {
        if !self.config.enable_per_node_failure_tables {
            return None;
        }
        let inner = self.inner.lock();
        inner.entries.get(key).map(|e| e.timed_out_nodes())
    }

    /// Notification hook for peer disconnects. A no-op in the source this
    /// crate is modeled on, modulo a FIXME about proactively pruning weak
    /// references; we do nothing here and let the periodic cleaner (which
    /// already drops gone weak refs) catch up, per spec §9's note that this
    /// is not mandated.
    pub fn on_disconnect(&self, _peer: &PeerHandle) {}

    /// Halves the entries index by popping LRU-oldest until size is halved
    /// (spec §4.6, low-memory signal).
    pub fn on_low_memory(&self) {
        let mut inner = self.inner.lock();
        let target = inner.entries.size() / 2;
        let mut evicted = 0;
        while inner.entries.size() > target {
            if inner.entries.pop_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        debug!(evicted, remaining = inner.entries.size(), "low memory shed");
    }

    /// Clears the entries index entirely. The offers index is untouched: it's
    /// smaller and more valuable (spec §4.6, OOM signal).
    pub fn on_oom(&self) {
        let mut inner = self.inner.lock();
        let evicted = inner.entries.size();
        while inner.entries.pop_oldest().is_some() {}
        debug!(evicted, "OOM shed entire entries index");
    }

    pub fn entries_len(&self) -> usize {
        self.inner.lock().entries.size()
    }

    pub fn offers_len(&self) -> usize {
        self.inner.lock().offers.size()
    }
}
