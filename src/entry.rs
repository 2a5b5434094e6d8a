use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::auth::compute_authenticator;
use crate::key::Key;
use crate::peer::{PeerHandle, WeakPeerHandle};
use crate::transport::{OutboundMessage, Transport};

struct Requestor {
    handle: WeakPeerHandle,
    last_asked: Instant,
}

struct RoutedTo {
    handle: WeakPeerHandle,
    last_tried: Instant,
    timeout_until: Instant,
    htl: u8,
}

/// A read-only view of one routed-to record, for `FailureTable::timed_out_nodes_list`.
#[derive(Debug, Clone, Copy)]
pub struct RoutedToView {
    pub peer_id: u64,
    pub timeout_until: Instant,
    pub htl: u8,
}

struct EntryInner {
    requestors: HashMap<u64, Requestor>,
    routed_to: HashMap<u64, RoutedTo>,
    creation_time: Instant,
    last_update: Instant,
}

/// Per-key record of requestor peers, routed-to peers, timestamps, and HTL
/// (spec §3/§4.2, component C1).
///
/// Mutations to a given Entry are totally ordered by the Entry's own lock,
/// which must never be acquired while holding the FailureTable's coarse lock
/// (spec §4.1/§5 lock ordering: FailureTable first, then Entry).
pub struct Entry {
    key: Key,
    inner: Mutex<EntryInner>,
}

impl Entry {
    pub fn new(key: Key, now: Instant) -> Self {
        Self {
            key,
            inner: Mutex::new(EntryInner {
                requestors: HashMap::new(),
                routed_to: HashMap::new(),
                creation_time: now,
                last_update: now,
            }),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Inserts or updates the routed-to record for `peer`. If the peer was
    /// already present with a later `timeout_until`, the later one is kept
    /// (spec §4.2 `failed_to`).
    pub fn failed_to(&self, peer: &PeerHandle, timeout: Duration, now: Instant, htl: u8) {
        let mut inner = self.inner.lock();
        inner.last_update = now;
        let timeout_until = now + timeout;
        inner
            .routed_to
            .entry(peer.id())
            .and_modify(|r| {
                if timeout_until > r.timeout_until {
                    r.timeout_until = timeout_until;
                }
                r.last_tried = now;
                r.htl = htl;
            })
            .or_insert_with(|| RoutedTo {
                handle: peer.downgrade(),
                last_tried: now,
                timeout_until,
                htl,
            });
    }

    pub fn add_requestor(&self, peer: &PeerHandle, now: Instant) {
        let mut inner = self.inner.lock();
        inner.last_update = now;
        inner
            .requestors
            .entry(peer.id())
            .and_modify(|r| r.last_asked = now)
            .or_insert_with(|| Requestor {
                handle: peer.downgrade(),
                last_asked: now,
            });
    }

    /// Did we route a request to `peer`?
    pub fn asked_from_peer(&self, peer_id: u64) -> bool {
        self.inner.lock().routed_to.contains_key(&peer_id)
    }

    /// Did `peer` ask us?
    pub fn asked_by_peer(&self, peer_id: u64) -> bool {
        self.inner.lock().requestors.contains_key(&peer_id)
    }

    /// True iff some requestor other than `excluded` still resolves to a live peer.
    pub fn others_want(&self, excluded: Option<u64>) -> bool {
        self.inner.lock().requestors.iter().any(|(id, r)| {
            Some(*id) != excluded && !r.handle.is_gone()
        })
    }

    /// True iff any recorded requestor is still interested (spec `peers_want_key`).
    pub fn peers_want(&self) -> bool {
        self.others_want(None)
    }

    /// A read-only snapshot of routed-to records, for the routing layer to avoid
    /// re-routing to peers whose timeout hasn't elapsed (`timed_out_nodes_list`).
    pub fn timed_out_nodes(&self) -> Vec<RoutedToView> {
        self.inner
            .lock()
            .routed_to
            .values()
            .map(|r| RoutedToView {
                peer_id: r.handle.id(),
                timeout_until: r.timeout_until,
                htl: r.htl,
            })
            .collect()
    }

    /// Drops members whose weak peer reference is gone, whose record age
    /// exceeds `max_lifetime`, or whose timeout has fully elapsed and which add
    /// no further information. Returns true if anything changed.
    pub fn cleanup(&self, now: Instant, max_lifetime: Duration) -> bool {
        let mut inner = self.inner.lock();
        let expired_overall = now.duration_since(inner.creation_time) > max_lifetime;

        let before_req = inner.requestors.len();
        let before_routed = inner.routed_to.len();

        if expired_overall {
            inner.requestors.clear();
            inner.routed_to.clear();
        } else {
            inner.requestors.retain(|_, r| !r.handle.is_gone());
            inner.routed_to.retain(|_, r| {
                let alive = !r.handle.is_gone();
                let timed_out = now >= r.timeout_until;
                // A routed-to record whose reject window has fully elapsed adds
                // no more information than "we could route to this peer again" -
                // which is the default - so it's safe to drop.
                alive && !timed_out
            });
        }

        let changed =
            inner.requestors.len() != before_req || inner.routed_to.len() != before_routed;
        if changed {
            trace!(key = %self.key, "entry cleanup removed stale members");
        }
        changed
    }

    /// Empty iff there's nothing left to act on, or the entry has outlived
    /// `max_lifetime` regardless of contents (spec §4.2, open question resolved
    /// in DESIGN.md).
    pub fn is_empty(&self, now: Instant, max_lifetime: Duration) -> bool {
        let inner = self.inner.lock();
        if now.duration_since(inner.creation_time) > max_lifetime {
            return true;
        }
        inner.requestors.is_empty() && inner.routed_to.is_empty()
    }

    /// Emits a `BlockOffer` to every currently resolvable requestor. Returns the
    /// number of peers actually offered to. Must be called with no lock held on
    /// the owning `FailureTable` (spec §4.1 `on_found`).
    pub fn offer(&self, authenticator_key: &[u8; 32], transport: &dyn Transport) -> usize {
        let targets: Vec<PeerHandle> = {
            let inner = self.inner.lock();
            inner
                .requestors
                .values()
                .filter_map(|r| r.handle.upgrade())
                .collect()
        };

        let mut sent = 0;
        for peer in &targets {
            let authenticator = compute_authenticator(authenticator_key, &self.key, peer.id());
            let msg = OutboundMessage::BlockOffer {
                key: self.key,
                authenticator,
                boot_id: peer.boot_id(),
            };
            if transport.send(peer, msg).is_ok() {
                sent += 1;
            }
        }
        sent
    }
}
