/// Variant tag for a content key, per spec §3.
///
/// CHK (content-hash key) is content-addressed and unforgeable: the key *is* a
/// hash of the block, so a peer can't bait us into accepting an arbitrary block
/// under someone else's key. SSK (signed-subspace key) is owner-signed, not
/// content-addressed, so that guarantee doesn't hold (see `policy.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Chk,
    Ssk,
}

/// Opaque 32-byte content identifier with a variant tag. Equality and hash are
/// defined over the full bytes, i.e. kind + payload together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub kind: KeyKind,
    pub bytes: [u8; 32],
}

impl Key {
    pub fn new(kind: KeyKind, bytes: [u8; 32]) -> Self {
        Self { kind, bytes }
    }

    pub fn chk(bytes: [u8; 32]) -> Self {
        Self::new(KeyKind::Chk, bytes)
    }

    pub fn ssk(bytes: [u8; 32]) -> Self {
        Self::new(KeyKind::Ssk, bytes)
    }

    pub fn is_chk(&self) -> bool {
        matches!(self.kind, KeyKind::Chk)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.kind, hex::encode(self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_over_kind_and_bytes() {
        let a = Key::chk([1u8; 32]);
        let b = Key::ssk([1u8; 32]);
        assert_ne!(a, b, "same bytes, different kind, must not be equal");
        assert_eq!(Key::chk([2u8; 32]), Key::chk([2u8; 32]));
    }
}
