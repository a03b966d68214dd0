//! Signing: Ed25519.
//!
//! Ed25519 uses a managed hasher: the session feeds data and signing
//! associated data into the shared hash, and the signature covers the
//! finished sum.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

use crate::logic::{
    cached_private, cached_public, decode_stored_key, encode_stored_key, CachedKeys, KeyHandler,
    KeySlot, Signer, ToolInstance,
};
use crate::random::JessRng;
use crate::tool::{Purpose, Tool, ToolInfo, ToolOption};
use crate::ToolError;

pub(crate) fn ed25519_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "Ed25519",
            purpose: Purpose::Signing,
            options: &[ToolOption::NeedsManagedHasher],
            key_size: 0,
            nonce_size: 0,
            security_level: 128,
            comment: "RFC 8032",
            author: "Daniel J. Bernstein, 2011",
        },
        key_handler: Some(&Ed25519Keys),
        factory: |_| Ok(ToolInstance::Signer(Box::new(Ed25519))),
    }
}

struct Ed25519;

impl Signer for Ed25519 {
    fn sign(
        &self,
        _data: &[u8],
        _associated_data: &[u8],
        managed_sum: Option<&[u8]>,
        local: &dyn KeySlot,
    ) -> Result<Vec<u8>, ToolError> {
        let sum = managed_sum.ok_or(ToolError::op("Ed25519", "managed hash not configured"))?;
        let key = signing_key(local)?;
        Ok(key.sign(sum).to_bytes().to_vec())
    }

    fn verify(
        &self,
        _data: &[u8],
        _associated_data: &[u8],
        managed_sum: Option<&[u8]>,
        signature: &[u8],
        remote: &dyn KeySlot,
    ) -> Result<(), ToolError> {
        let sum = managed_sum.ok_or(ToolError::op("Ed25519", "managed hash not configured"))?;
        let key = verifying_key(remote)?;
        let signature = Signature::from_slice(signature).map_err(|_| ToolError::InvalidSignature)?;
        key.verify(sum, &signature).map_err(|_| ToolError::InvalidSignature)
    }
}

fn signing_key(slot: &dyn KeySlot) -> Result<SigningKey, ToolError> {
    let seed: [u8; 32] =
        cached_private(slot)?.try_into().map_err(|_| ToolError::InvalidKey)?;
    Ok(SigningKey::from_bytes(&seed))
}

fn verifying_key(slot: &dyn KeySlot) -> Result<VerifyingKey, ToolError> {
    let public: [u8; 32] =
        cached_public(slot)?.try_into().map_err(|_| ToolError::InvalidKey)?;
    VerifyingKey::from_bytes(&public).map_err(|_| ToolError::InvalidKey)
}

/// Static key management for Ed25519 signets.
pub(crate) struct Ed25519Keys;

impl KeyHandler for Ed25519Keys {
    fn generate_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let signing = SigningKey::generate(&mut JessRng);
        slot.set_cached_keys(CachedKeys::pair(
            signing.verifying_key().to_bytes().to_vec(),
            signing.to_bytes().to_vec(),
        ));
        Ok(())
    }

    fn load_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let (stored, public) = slot.stored_key();
        let raw = decode_stored_key(stored)?.to_vec();
        let keys = if public {
            if raw.len() != 32 {
                return Err(ToolError::InvalidKey);
            }
            CachedKeys::public_only(raw)
        } else {
            // Private storage carries seed and public key.
            if raw.len() != 64 {
                return Err(ToolError::InvalidKey);
            }
            CachedKeys::pair(raw[32..].to_vec(), raw[..32].to_vec())
        };
        slot.set_cached_keys(keys);
        Ok(())
    }

    fn store_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let keys = slot.cached_keys().ok_or(ToolError::InvalidKey)?;
        let (stored, public) = match &keys.private {
            Some(seed) => (encode_stored_key(&[seed, &keys.public]), false),
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
    fn sign_and_verify_roundtrip() {
        let mut slot = TestSlot::new("Ed25519");
        Ed25519Keys.generate_key(&mut slot).unwrap();

        let sum = [0x42u8; 32];
        let signature = Ed25519.sign(b"", b"", Some(&sum), &slot).unwrap();
        Ed25519.verify(b"", b"", Some(&sum), &signature, &slot).unwrap();
    }

    #[test]
    fn flipped_signature_fails() {
        let mut slot = TestSlot::new("Ed25519");
        Ed25519Keys.generate_key(&mut slot).unwrap();

        let sum = [0x42u8; 32];
        let mut signature = Ed25519.sign(b"", b"", Some(&sum), &slot).unwrap();
        signature[7] ^= 0x01;
        assert!(Ed25519.verify(b"", b"", Some(&sum), &signature, &slot).is_err());
    }

    #[test]
    fn store_and_load_private_key() {
        let mut slot = TestSlot::new("Ed25519");
        Ed25519Keys.generate_key(&mut slot).unwrap();
        let original = slot.cached.clone().unwrap();

        Ed25519Keys.store_key(&mut slot).unwrap();
        slot.cached = None;
        Ed25519Keys.load_key(&mut slot).unwrap();

        let loaded = slot.cached.as_ref().unwrap();
        assert_eq!(loaded.public, original.public);
        assert_eq!(loaded.private, original.private);
    }

    #[test]
    fn public_storage_has_no_private_half() {
        let mut slot = TestSlot::new("Ed25519");
        Ed25519Keys.generate_key(&mut slot).unwrap();
        let public = slot.cached.as_ref().unwrap().public.clone();

        slot.cached = Some(CachedKeys::public_only(public));
        Ed25519Keys.store_key(&mut slot).unwrap();
        assert!(slot.public);

        slot.cached = None;
        Ed25519Keys.load_key(&mut slot).unwrap();
        assert!(slot.cached.as_ref().unwrap().private.is_none());
    }
}
