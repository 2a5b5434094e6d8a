use crate::block::Block;
use crate::error::Result;
use crate::key::Key;
use crate::peer::PeerHandle;

/// Why a `send_offered_key` request was rejected (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferedKeyRejectReason {
    NoKey,
}

/// Wire message codes as used on the wire, per spec §6. Encoding to bytes is the
/// transport layer's job (out of scope); these are the typed, in-process messages
/// handed to a channel, the same boundary librqbit draws around `WriterRequest`.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    GetOfferedKeyInvalid {
        uid: u64,
        reason: OfferedKeyRejectReason,
    },
    SskDataFoundHeaders {
        uid: u64,
        headers: bytes::Bytes,
    },
    SskDataFoundData {
        uid: u64,
        data: bytes::Bytes,
    },
    SskPubKey {
        uid: u64,
        pub_key: bytes::Bytes,
    },
    /// Legacy combined message, sent for backward-compat wire format alongside
    /// the split headers/data messages (spec §4.4).
    SskDataFound {
        uid: u64,
        headers: bytes::Bytes,
        data: bytes::Bytes,
    },
    ChkDataFound {
        uid: u64,
        headers: bytes::Bytes,
    },
    /// Emitted by `Entry::offer()` to every still-resolvable requestor.
    BlockOffer {
        key: Key,
        authenticator: [u8; 32],
        boot_id: u64,
    },
}

/// Number of fixed-size packets a `BlockTransmitter` splits a CHK block into,
/// and the size of each packet, per spec §4.4/§6.
pub const PACKETS_IN_BLOCK: usize = 32;
pub const PACKET_SIZE: usize = 1024;

/// Datastore collaborator (external, out of scope per spec §1): block fetch and
/// presence check.
pub trait Datastore: Send + Sync {
    fn has_key(&self, key: &Key) -> bool;
    fn fetch(&self, key: &Key) -> Option<Block>;
}

/// Transport collaborator: send a typed outbound message to a peer. May fail
/// with `PeerDisconnected`; callers treat that as best-effort and ignore it,
/// but must still release any uid they hold (spec §7).
pub trait Transport: Send + Sync {
    fn send(&self, peer: &PeerHandle, msg: OutboundMessage) -> Result<()>;
}

/// `BlockTransmitter` packetises a raw CHK block into `PACKETS_IN_BLOCK` packets
/// of `PACKET_SIZE` bytes and streams them, possibly blocking on congestion for
/// up to the caller's deadline.
pub trait BlockTransmitter: Send + Sync {
    fn transmit(&self, peer: &PeerHandle, block: &Block) -> Result<()>;
}

/// Owner of transaction identifiers (`uid`s). Releasing a uid makes the slot
/// reusable; failing to release it on every exit path leaks the slot until
/// process restart (spec §4.4/§7).
pub trait UidReleaser: Send + Sync {
    fn unlock_uid(&self, uid: u64);
}

/// Client-facing request queue (external, out of scope per spec §1).
///
/// `dequeue_offered_key` is called on every path that removes an `OfferSet`
/// from the table's offers index: `FailureTable::on_found`, `OfferIterator::
/// accept_last` emptying the last record, and the cleaner's expiry sweep.
pub trait ClientQueue: Send + Sync {
    fn maybe_queue_offered_key(&self, key: &Key, others_want: bool);
    fn dequeue_offered_key(&self, key: &Key);
}

/// Convenience no-op queue, useful for tests and for callers that don't wire up
/// a real client layer.
#[derive(Debug, Default)]
pub struct NullClientQueue;

impl ClientQueue for NullClientQueue {
    fn maybe_queue_offered_key(&self, _key: &Key, _others_want: bool) {}
    fn dequeue_offered_key(&self, _key: &Key) {}
}
