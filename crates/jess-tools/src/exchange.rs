//! Key exchange: ECDH over X25519.

use x25519_dalek::{PublicKey, StaticSecret};

use crate::logic::{
    cached_private, cached_public, decode_stored_key, encode_stored_key, CachedKeys, KeyExchanger,
    KeyHandler, KeySlot, ToolInstance,
};
use crate::random::JessRng;
use crate::tool::{Purpose, Tool, ToolInfo};
use crate::ToolError;

pub(crate) fn x25519_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "ECDH-X25519",
            purpose: Purpose::KeyExchange,
            options: &[],
            key_size: 0,
            nonce_size: 0,
            security_level: 128,
            comment: "RFC 7748",
            author: "Daniel J. Bernstein, 2005",
        },
        key_handler: Some(&X25519Keys),
        factory: |_| Ok(ToolInstance::KeyExchanger(Box::new(X25519))),
    }
}

struct X25519;

impl KeyExchanger for X25519 {
    fn make_shared_key(
        &self,
        local: &dyn KeySlot,
        remote: &dyn KeySlot,
    ) -> Result<Vec<u8>, ToolError> {
        let secret: [u8; 32] =
            cached_private(local)?.try_into().map_err(|_| ToolError::InvalidKey)?;
        let public: [u8; 32] =
            cached_public(remote)?.try_into().map_err(|_| ToolError::InvalidKey)?;

        let shared = StaticSecret::from(secret).diffie_hellman(&PublicKey::from(public));
        Ok(shared.as_bytes().to_vec())
    }
}

/// Static key management for X25519 signets.
pub(crate) struct X25519Keys;

impl KeyHandler for X25519Keys {
    fn generate_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let secret = StaticSecret::random_from_rng(JessRng);
        let public = PublicKey::from(&secret);
        slot.set_cached_keys(CachedKeys::pair(
            public.as_bytes().to_vec(),
            secret.to_bytes().to_vec(),
        ));
        Ok(())
    }

    fn load_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let (stored, public) = slot.stored_key();
        let raw = decode_stored_key(stored)?.to_vec();
        let keys = match (public, raw.len()) {
            (true, 32) => CachedKeys::public_only(raw),
            (false, 64) => CachedKeys::pair(raw[..32].to_vec(), raw[32..].to_vec()),
            _ => return Err(ToolError::InvalidKey),
        };
        slot.set_cached_keys(keys);
        Ok(())
    }

    fn store_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let keys = slot.cached_keys().ok_or(ToolError::InvalidKey)?;
        let (stored, public) = match &keys.private {
            Some(secret) => (encode_stored_key(&[&keys.public, secret]), false),
            None => (encode_stored_key(&[&keys.public]), true),
        };
        slot.set_stored_key(stored, public);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::tests_support::TestSlot;

    #[test]
    fn both_sides_derive_the_same_secret() {
        let mut alice = TestSlot::new("ECDH-X25519");
        let mut bob = TestSlot::new("ECDH-X25519");
        X25519Keys.generate_key(&mut alice).unwrap();
        X25519Keys.generate_key(&mut bob).unwrap();

        let from_alice = X25519.make_shared_key(&alice, &bob).unwrap();
        let from_bob = X25519.make_shared_key(&bob, &alice).unwrap();
        assert_eq!(from_alice, from_bob);
        assert_eq!(from_alice.len(), 32);
    }

    #[test]
    fn different_peers_derive_different_secrets() {
        let mut alice = TestSlot::new("ECDH-X25519");
        let mut bob = TestSlot::new("ECDH-X25519");
        let mut eve = TestSlot::new("ECDH-X25519");
        X25519Keys.generate_key(&mut alice).unwrap();
        X25519Keys.generate_key(&mut bob).unwrap();
        X25519Keys.generate_key(&mut eve).unwrap();

        let with_bob = X25519.make_shared_key(&alice, &bob).unwrap();
        let with_eve = X25519.make_shared_key(&alice, &eve).unwrap();
        assert_ne!(with_bob, with_eve);
    }

    #[test]
    fn store_and_load_roundtrip() {
        let mut slot = TestSlot::new("ECDH-X25519");
        X25519Keys.generate_key(&mut slot).unwrap();
        let original = slot.cached.clone().unwrap();

        X25519Keys.store_key(&mut slot).unwrap();
        slot.cached = None;
        X25519Keys.load_key(&mut slot).unwrap();

        let loaded = slot.cached.as_ref().unwrap();
        assert_eq!(loaded.public, original.public);
        assert_eq!(loaded.private, original.private);
    }

    #[test]
    fn truncated_storage_is_rejected() {
        let mut slot = TestSlot::new("ECDH-X25519");
        slot.set_stored_key(vec![1, 2, 3], false);
        assert!(matches!(X25519Keys.load_key(&mut slot), Err(ToolError::InvalidKey)));
    }
}
