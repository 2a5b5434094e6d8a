use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::key::Key;
use crate::offer::OfferRecord;
use crate::offer::OfferSet;
use crate::peer::PeerHandle;
use crate::policy::acceptance_law;
use crate::table::FailureTable;
use crate::transport::{BlockTransmitter, OfferedKeyRejectReason, OutboundMessage, Transport, UidReleaser};

/// 60 second deadline on throttled payload sends (spec §4.4).
const TRANSFER_DEADLINE: Duration = Duration::from_secs(60);

/// Work items for the offer serial queue (spec §4.1/§4.4, components C5/C6).
/// Within this queue, operations on the same key are FIFO-ordered (spec §5);
/// since it's a single `mpsc` channel drained by one consumer task, that falls
/// out for free.
pub(crate) enum OfferQueueTask {
    IncomingOffer {
        key: Key,
        peer: PeerHandle,
        authenticator: [u8; 32],
    },
    SendOfferedKey {
        key: Key,
        is_ssk: bool,
        need_pub_key: bool,
        uid: u64,
        source: PeerHandle,
    },
}

/// Releases `uid` exactly once on drop, covering every exit path including
/// panics - the source's "uid release is mandatory on every exit path"
/// requirement (spec §4.4/§7/invariant 7), the same way `file_locking.rs`'s
/// `SessionGuard` guarantees `RmEndSession` runs no matter how the function exits.
struct UidGuard {
    uid: u64,
    releaser: Arc<dyn UidReleaser>,
}

impl UidGuard {
    fn new(uid: u64, releaser: Arc<dyn UidReleaser>) -> Self {
        Self { uid, releaser }
    }
}

impl Drop for UidGuard {
    fn drop(&mut self) {
        trace!(uid = self.uid, "releasing uid");
        self.releaser.unlock_uid(self.uid);
    }
}

/// The offer serial queue's consumer loop: a single-threaded, high-priority
/// worker (spec §4.4's "single-threaded high-priority serial queue"). Disk I/O
/// (`has_key`, `fetch`) happens directly on this task; actual network sends are
/// re-dispatched to the general executor via `tokio::spawn`, per spec §5's
/// "network I/O must be re-dispatched off the queue".
pub(crate) async fn run_offer_queue(table: Arc<FailureTable>, mut rx: mpsc::UnboundedReceiver<OfferQueueTask>) {
    while let Some(task) = rx.recv().await {
        match task {
            OfferQueueTask::IncomingOffer {
                key,
                peer,
                authenticator,
            } => handle_incoming_offer(&table, key, peer, authenticator).await,
            OfferQueueTask::SendOfferedKey {
                key,
                is_ssk,
                need_pub_key,
                uid,
                source,
            } => handle_send_offered_key(table.clone(), key, is_ssk, need_pub_key, uid, source).await,
        }
    }
}

/// Offer acceptance policy (spec §4.3, component C5), run after the task has
/// been dequeued from the serial executor.
async fn handle_incoming_offer(table: &FailureTable, key: Key, peer: PeerHandle, authenticator: [u8; 32]) {
    let datastore = table.datastore.clone();
    let has_key = {
        let key = key;
        table
            .blocking_spawner
            .spawn_block_in_place(move || datastore.has_key(&key))
    };
    if has_key {
        trace!(%key, "incoming offer discarded: datastore already has key");
        return;
    }

    let entry = {
        let inner = table.inner.lock();
        inner.entries.get(&key).cloned()
    };
    let Some(entry) = entry else {
        trace!(%key, "incoming offer discarded: entry vanished");
        return;
    };

    let we_asked = entry.asked_from_peer(peer.id());
    let he_asked = entry.asked_by_peer(peer.id());
    let accept = acceptance_law(key.is_chk(), we_asked, he_asked);

    if !accept {
        debug!(%key, peer = peer.id(), "offer rejected: acceptance policy");
        let now = table.clock.now();
        if entry.is_empty(now, table.config.max_lifetime) {
            let mut inner = table.inner.lock();
            inner.entries.remove(&key);
        }
        return;
    }

    let now = table.clock.now();
    let record = OfferRecord::new(now, peer.downgrade(), authenticator, peer.boot_id());
    let set = {
        let mut inner = table.inner.lock();
        let set = match inner.offers.get(&key) {
            Some(s) => s.clone(),
            None => Arc::new(OfferSet::new(key)),
        };
        if let Some((evicted, _)) = inner.offers.push(key, set.clone()) {
            trace!(evicted = %evicted, "offers LRU evicted oldest key");
        }
        set
    };
    set.push(record);

    let others_want = entry.others_want(Some(peer.id()));
    table.client_queue.maybe_queue_offered_key(&key, others_want);
}

/// Sends a message on the general executor, since sends may block on
/// congestion and must not stall the offer serial queue (spec §5).
async fn blocking_send(transport: Arc<dyn Transport>, peer: PeerHandle, msg: OutboundMessage) -> crate::error::Result<()> {
    match tokio::task::spawn_blocking(move || transport.send(&peer, msg)).await {
        Ok(res) => res,
        Err(join_err) => {
            error!(?join_err, "transport send task panicked");
            Ok(())
        }
    }
}

/// Offer serve pipeline (spec §4.4, component C6).
async fn handle_send_offered_key(
    table: Arc<FailureTable>,
    key: Key,
    is_ssk: bool,
    need_pub_key: bool,
    uid: u64,
    source: PeerHandle,
) {
    let datastore = table.datastore.clone();
    let block = {
        let key = key;
        table
            .blocking_spawner
            .spawn_block_in_place(move || datastore.fetch(&key))
    };

    let Some(block) = block else {
        let _ = blocking_send(
            table.transport.clone(),
            source,
            OutboundMessage::GetOfferedKeyInvalid {
                uid,
                reason: OfferedKeyRejectReason::NoKey,
            },
        )
        .await;
        table.uid_releaser.unlock_uid(uid);
        return;
    };

    if is_ssk {
        if blocking_send(
            table.transport.clone(),
            source.clone(),
            OutboundMessage::SskDataFoundHeaders {
                uid,
                headers: block.headers.clone(),
            },
        )
        .await
        .is_err()
        {
            table.uid_releaser.unlock_uid(uid);
            return;
        }

        spawn_ssk_data_worker(table.transport.clone(), table.uid_releaser.clone(), source.clone(), uid, block.data.clone());

        // Wire-compat order per spec §9's design note: headers, data worker
        // dispatch, legacy combined message, then pubkey.
        let _ = blocking_send(
            table.transport.clone(),
            source.clone(),
            OutboundMessage::SskDataFound {
                uid,
                headers: block.headers.clone(),
                data: block.data.clone(),
            },
        )
        .await;

        if need_pub_key {
            if let Some(pub_key) = block.pub_key.clone() {
                let _ = blocking_send(table.transport.clone(), source, OutboundMessage::SskPubKey { uid, pub_key }).await;
            }
        }
    } else {
        if blocking_send(
            table.transport.clone(),
            source.clone(),
            OutboundMessage::ChkDataFound {
                uid,
                headers: block.headers.clone(),
            },
        )
        .await
        .is_err()
        {
            table.uid_releaser.unlock_uid(uid);
            return;
        }

        spawn_chk_transmit_worker(table.block_transmitter.clone(), table.uid_releaser.clone(), source, uid, block);
    }
}

fn spawn_ssk_data_worker(transport: Arc<dyn Transport>, releaser: Arc<dyn UidReleaser>, peer: PeerHandle, uid: u64, data: bytes::Bytes) {
    tokio::spawn(async move {
        let _guard = UidGuard::new(uid, releaser);
        let send = tokio::task::spawn_blocking(move || transport.send(&peer, OutboundMessage::SskDataFoundData { uid, data }));
        match tokio::time::timeout(TRANSFER_DEADLINE, send).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(uid, error = ?e, "error sending SSK data payload"),
            Ok(Err(join_err)) => error!(uid, ?join_err, "SSK data send task panicked"),
            Err(_elapsed) => warn!(uid, "timed out sending SSK data payload"),
        }
    });
}

fn spawn_chk_transmit_worker(
    transmitter: Arc<dyn BlockTransmitter>,
    releaser: Arc<dyn UidReleaser>,
    peer: PeerHandle,
    uid: u64,
    block: crate::block::Block,
) {
    tokio::spawn(async move {
        let _guard = UidGuard::new(uid, releaser);
        let transmit = tokio::task::spawn_blocking(move || transmitter.transmit(&peer, &block));
        match tokio::time::timeout(TRANSFER_DEADLINE, transmit).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(uid, error = ?e, "error transmitting CHK block"),
            Ok(Err(join_err)) => error!(uid, ?join_err, "CHK transmit task panicked"),
            Err(_elapsed) => warn!(uid, "timed out transmitting CHK block"),
        }
    });
}
