use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::key::Key;

type HmacSha256 = Hmac<Sha256>;

/// HMAC(authenticator_key, key || peer_identity), binding an offer to this
/// process instance and this peer (spec §4.2). A stolen authenticator is
/// useless against other peers or a restarted node, since `peer_id` and the
/// per-process `authenticator_key` both feed the tag.
pub fn compute_authenticator(authenticator_key: &[u8; 32], key: &Key, peer_id: u64) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(authenticator_key).expect("HMAC can take key of any size");
    mac.update(&key.bytes);
    mac.update(&[match key.kind {
        crate::key::KeyKind::Chk => 0u8,
        crate::key::KeyKind::Ssk => 1u8,
    }]);
    mac.update(&peer_id.to_be_bytes());
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&tag);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticator_is_stable_for_same_inputs() {
        let k = [7u8; 32];
        let key = Key::chk([1u8; 32]);
        assert_eq!(
            compute_authenticator(&k, &key, 42),
            compute_authenticator(&k, &key, 42)
        );
    }

    #[test]
    fn authenticator_differs_per_peer() {
        let k = [7u8; 32];
        let key = Key::chk([1u8; 32]);
        assert_ne!(
            compute_authenticator(&k, &key, 1),
            compute_authenticator(&k, &key, 2)
        );
    }

    #[test]
    fn authenticator_differs_per_process_key() {
        let key = Key::chk([1u8; 32]);
        assert_ne!(
            compute_authenticator(&[1u8; 32], &key, 1),
            compute_authenticator(&[2u8; 32], &key, 1)
        );
    }
}
