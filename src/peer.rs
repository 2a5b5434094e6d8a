use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// The peer table's view of a peer: a monotonically increasing boot-id that
/// changes across restarts, so a stale offer from a peer that has since
/// restarted can be detected (spec §3).
struct PeerInner {
    id: u64,
    boot_id: AtomicU64,
}

/// A strong handle to a peer, owned by the peer table (external collaborator).
/// The failure table never holds one of these; it only ever holds the weak
/// counterpart, `WeakPeerHandle`, so it can't extend a peer's lifetime.
#[derive(Clone)]
pub struct PeerHandle(Arc<PeerInner>);

impl PeerHandle {
    pub fn new(id: u64, boot_id: u64) -> Self {
        Self(Arc::new(PeerInner {
            id,
            boot_id: AtomicU64::new(boot_id),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn boot_id(&self) -> u64 {
        self.0.boot_id.load(Ordering::Relaxed)
    }

    /// Simulates a peer restart: boot-id advances, invalidating offers recorded
    /// against the previous boot.
    pub fn bump_boot_id(&self) {
        self.0.boot_id.fetch_add(1, Ordering::Relaxed);
    }

    pub fn downgrade(&self) -> WeakPeerHandle {
        WeakPeerHandle {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle").field("id", &self.id()).finish()
    }
}

/// A weak reference to a peer. Resolution may yield "gone", which is treated
/// identically to "peer no longer interested" throughout this crate (spec §3).
#[derive(Clone)]
pub struct WeakPeerHandle {
    id: u64,
    inner: Weak<PeerInner>,
}

impl WeakPeerHandle {
    /// Stable identity, usable as a map key even once the peer is gone.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn upgrade(&self) -> Option<PeerHandle> {
        self.inner.upgrade().map(PeerHandle)
    }

    pub fn is_gone(&self) -> bool {
        self.inner.strong_count() == 0
    }

    /// The peer's current boot-id, or `None` if the peer is gone.
    pub fn boot_id(&self) -> Option<u64> {
        self.upgrade().map(|p| p.boot_id())
    }
}

impl std::fmt::Debug for WeakPeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakPeerHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_handle_resolves_while_strong_alive() {
        let p = PeerHandle::new(1, 0);
        let w = p.downgrade();
        assert!(w.upgrade().is_some());
        drop(p);
        assert!(w.upgrade().is_none());
        assert!(w.is_gone());
    }

    #[test]
    fn boot_id_advances_across_simulated_restart() {
        let p = PeerHandle::new(1, 0);
        let w = p.downgrade();
        assert_eq!(w.boot_id(), Some(0));
        p.bump_boot_id();
        assert_eq!(w.boot_id(), Some(1));
    }
}
