use crate::key::Key;

/// A block made available by the datastore (spec §4.1 `on_found`). The payload
/// encoding itself belongs to the CHK/SSK codec, out of scope per spec §1; here
/// it's an opaque byte buffer plus whatever header bytes the wire format needs.
#[derive(Debug, Clone)]
pub struct Block {
    pub key: Key,
    pub headers: bytes::Bytes,
    pub data: bytes::Bytes,
    /// Present only for SSK blocks that carry an embedded public key.
    pub pub_key: Option<bytes::Bytes>,
}

impl Block {
    pub fn new(key: Key, headers: bytes::Bytes, data: bytes::Bytes) -> Self {
        Self {
            key,
            headers,
            data,
            pub_key: None,
        }
    }

    pub fn with_pub_key(mut self, pub_key: bytes::Bytes) -> Self {
        self.pub_key = Some(pub_key);
        self
    }
}
