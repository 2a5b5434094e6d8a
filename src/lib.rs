//! Failure table / ULPR (Ultra-Lightweight Persistent Request) subsystem for a
//! content-routing darknet node.
//!
//! The [`FailureTable`] coordinator tracks per-key routing failures so a node
//! doesn't keep re-trying peers that just failed it, and lets nodes that
//! previously failed to find a key learn about it later via lightweight
//! offers, without re-running a full request.

mod auth;
mod block;
mod cleaner;
mod clock;
mod config;
mod entry;
mod error;
mod key;
mod lru_index;
mod offer;
mod peer;
mod policy;
mod serve;
mod spawn_utils;
mod table;
mod transport;

#[cfg(test)]
mod tests;

pub use block::Block;
pub use clock::{Clock, SystemClock, TestClock};
pub use config::FailureTableConfig;
pub use entry::RoutedToView;
pub use error::{FailureTableError, Result};
pub use key::{Key, KeyKind};
pub use offer::{OfferIterator, OfferRecord, RandomSource, ThreadRandomSource};
pub use peer::{PeerHandle, WeakPeerHandle};
pub use table::{FailureTable, FailureTableDeps};
pub use transport::{
    BlockTransmitter, ClientQueue, Datastore, NullClientQueue, OfferedKeyRejectReason, OutboundMessage, Transport,
    UidReleaser, PACKETS_IN_BLOCK, PACKET_SIZE,
};
