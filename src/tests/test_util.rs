//! Test doubles for the external collaborators declared in `transport.rs`, in
//! the same spirit as librqbit's own `tests/test_util.rs` mock peer/session helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::Block;
use crate::error::Result;
use crate::key::Key;
use crate::peer::PeerHandle;
use crate::transport::{BlockTransmitter, ClientQueue, Datastore, OutboundMessage, Transport, UidReleaser};

#[derive(Default)]
pub struct RecordingTransport {
    sent: AtomicUsize,
    messages: Mutex<Vec<(u64, OutboundMessage)>>,
}

impl RecordingTransport {
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<(u64, OutboundMessage)> {
        self.messages.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, peer: &PeerHandle, msg: OutboundMessage) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().push((peer.id(), msg));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockDatastore {
    blocks: Mutex<HashMap<Key, Block>>,
}

impl MockDatastore {
    pub fn insert(&self, block: Block) {
        self.blocks.lock().insert(block.key, block);
    }
}

impl Datastore for MockDatastore {
    fn has_key(&self, key: &Key) -> bool {
        self.blocks.lock().contains_key(key)
    }

    fn fetch(&self, key: &Key) -> Option<Block> {
        self.blocks.lock().get(key).cloned()
    }
}

#[derive(Default)]
pub struct RecordingClientQueue {
    queued: Mutex<Vec<(Key, bool)>>,
    dequeued: Mutex<Vec<Key>>,
}

impl RecordingClientQueue {
    pub fn queued(&self) -> Vec<(Key, bool)> {
        self.queued.lock().clone()
    }

    pub fn dequeued(&self) -> Vec<Key> {
        self.dequeued.lock().clone()
    }
}

impl ClientQueue for RecordingClientQueue {
    fn maybe_queue_offered_key(&self, key: &Key, others_want: bool) {
        self.queued.lock().push((*key, others_want));
    }

    fn dequeue_offered_key(&self, key: &Key) {
        self.dequeued.lock().push(*key);
    }
}

#[derive(Default)]
pub struct RecordingBlockTransmitter {
    transmitted: Mutex<Vec<(u64, Key)>>,
}

impl RecordingBlockTransmitter {
    pub fn transmitted(&self) -> Vec<(u64, Key)> {
        self.transmitted.lock().clone()
    }
}

impl BlockTransmitter for RecordingBlockTransmitter {
    fn transmit(&self, peer: &PeerHandle, block: &Block) -> Result<()> {
        self.transmitted.lock().push((peer.id(), block.key));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingUidReleaser {
    released: Mutex<Vec<u64>>,
}

impl RecordingUidReleaser {
    pub fn released(&self) -> Vec<u64> {
        self.released.lock().clone()
    }
}

impl UidReleaser for RecordingUidReleaser {
    fn unlock_uid(&self, uid: u64) {
        self.released.lock().push(uid);
    }
}

/// Bundle of every mock collaborator, kept alongside the `Arc<dyn Trait>`s
/// handed to `FailureTableDeps` so tests can inspect what happened.
pub struct Mocks {
    pub datastore: Arc<MockDatastore>,
    pub transport: Arc<RecordingTransport>,
    pub client_queue: Arc<RecordingClientQueue>,
    pub block_transmitter: Arc<RecordingBlockTransmitter>,
    pub uid_releaser: Arc<RecordingUidReleaser>,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            datastore: Arc::new(MockDatastore::default()),
            transport: Arc::new(RecordingTransport::default()),
            client_queue: Arc::new(RecordingClientQueue::default()),
            block_transmitter: Arc::new(RecordingBlockTransmitter::default()),
            uid_releaser: Arc::new(RecordingUidReleaser::default()),
        }
    }

    pub fn deps(&self) -> crate::table::FailureTableDeps {
        crate::table::FailureTableDeps {
            datastore: self.datastore.clone(),
            transport: self.transport.clone(),
            client_queue: self.client_queue.clone(),
            block_transmitter: self.block_transmitter.clone(),
            uid_releaser: self.uid_releaser.clone(),
        }
    }
}

/// Polls `cond` until it's true or `timeout` elapses, yielding to the runtime
/// between attempts. Used to observe effects of the offer serial queue's
/// background task, which runs asynchronously relative to the test.
pub async fn wait_until<F: Fn() -> bool>(cond: F, timeout: std::time::Duration) {
    let start = tokio::time::Instant::now();
    loop {
        if cond() {
            return;
        }
        if start.elapsed() > timeout {
            panic!("condition did not become true within {timeout:?}");
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
