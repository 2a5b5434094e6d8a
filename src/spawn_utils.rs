/// Runs potentially-blocking synchronous work (datastore lookups, transport
/// sends that block on congestion) without starving the async runtime.
///
/// Grounded on librqbit's own `BlockingSpawner`: on a multi-thread runtime it
/// uses `tokio::task::block_in_place`, which lets the current worker thread be
/// reused by other tasks while this one blocks; on a current-thread runtime
/// that's unavailable, so it just calls the closure inline.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockingSpawner {
    allow_tokio_block_in_place: bool,
}

impl BlockingSpawner {
    pub fn new(allow_tokio_block_in_place: bool) -> Self {
        Self {
            allow_tokio_block_in_place,
        }
    }

    pub fn spawn_block_in_place<F: FnOnce() -> R, R>(&self, f: F) -> R {
        if self.allow_tokio_block_in_place {
            return tokio::task::block_in_place(f);
        }
        f()
    }
}

impl Default for BlockingSpawner {
    fn default() -> Self {
        let allow_block_in_place = match tokio::runtime::Handle::try_current() {
            Ok(h) => !matches!(h.runtime_flavor(), tokio::runtime::RuntimeFlavor::CurrentThread),
            Err(_) => false,
        };
        Self::new(allow_block_in_place)
    }
}
