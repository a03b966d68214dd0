//! Key encapsulation: RSA-OAEP.
//!
//! The wrapped key must fit into the modulus minus the OAEP overhead of two
//! hash digests plus two bytes; encapsulating a key that is too large for
//! the recipient's modulus fails with a descriptive error.

use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha512};

use crate::hashes::HashTool;
use crate::logic::{
    decode_stored_key, encode_stored_key, CachedKeys, KeyEncapsulator, KeyHandler, KeySlot,
    ToolInstance,
};
use crate::random::JessRng;
use crate::tool::{Purpose, Tool, ToolInfo, ToolOption};
use crate::ToolError;

type Blake2b256 = blake2::Blake2b<blake2::digest::consts::U32>;

pub(crate) fn rsa_oaep_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "RSA-OAEP",
            purpose: Purpose::KeyEncapsulation,
            options: &[ToolOption::NeedsDedicatedHasher, ToolOption::NeedsSecurityLevel],
            key_size: 0,
            nonce_size: 0,
            security_level: 0, // depends on the modulus size of the signet
            comment: "PKCS #1 v2.2, RFC 8017",
            author: "Bellare and Rogaway, 1994",
        },
        key_handler: Some(&RsaKeys),
        factory: |hash| {
            let hash = hash.ok_or(ToolError::HasherRequired { tool: "RSA-OAEP" })?;
            Ok(ToolInstance::KeyEncapsulator(Box::new(RsaOaep { hash })))
        },
    }
}

struct RsaOaep {
    hash: &'static HashTool,
}

impl RsaOaep {
    fn padding(&self) -> Result<Oaep, ToolError> {
        match self.hash.name {
            "SHA2-256" => Ok(Oaep::new::<Sha256>()),
            "SHA2-512" => Ok(Oaep::new::<Sha512>()),
            "BLAKE2b-256" => Ok(Oaep::new::<Blake2b256>()),
            other => Err(ToolError::HashToolNotFound(other.to_string())),
        }
    }
}

impl KeyEncapsulator for RsaOaep {
    fn encapsulate_key(&self, key: &[u8], remote: &dyn KeySlot) -> Result<Vec<u8>, ToolError> {
        let public = public_key(remote)?;

        // The message must be no longer than the modulus minus twice the
        // digest size, minus a further 2.
        let max_msg_size = public.size().saturating_sub(2 * self.hash.digest_size + 2);
        if key.len() > max_msg_size {
            return Err(ToolError::op(
                "RSA-OAEP",
                format!(
                    "key too long for encapsulation (modulus holds at most {max_msg_size} bytes, key has {})",
                    key.len()
                ),
            ));
        }

        public
            .encrypt(&mut JessRng, self.padding()?, key)
            .map_err(|err| ToolError::op("RSA-OAEP", err.to_string()))
    }

    fn unwrap_key(&self, wrapped: &[u8], local: &dyn KeySlot) -> Result<Vec<u8>, ToolError> {
        let private = private_key(local)?;
        private
            .decrypt(self.padding()?, wrapped)
            .map_err(|err| ToolError::op("RSA-OAEP", err.to_string()))
    }
}

fn public_key(slot: &dyn KeySlot) -> Result<RsaPublicKey, ToolError> {
    let keys = slot.cached_keys().ok_or(ToolError::InvalidKey)?;
    RsaPublicKey::from_pkcs1_der(&keys.public).map_err(|_| ToolError::InvalidKey)
}

fn private_key(slot: &dyn KeySlot) -> Result<RsaPrivateKey, ToolError> {
    let keys = slot.cached_keys().ok_or(ToolError::InvalidKey)?;
    let der = keys.private.as_deref().ok_or(ToolError::InvalidKey)?;
    RsaPrivateKey::from_pkcs1_der(der).map_err(|_| ToolError::InvalidKey)
}

/// Static key management for RSA signets. Cached keys hold PKCS #1 DER.
pub(crate) struct RsaKeys;

impl KeyHandler for RsaKeys {
    fn generate_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        // Key generation outside a session uses the 128 bit default level.
        generate_with_bits(slot, 3072)
    }

    fn load_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let (stored, public) = slot.stored_key();
        let raw = decode_stored_key(stored)?.to_vec();
        let keys = if public {
            RsaPublicKey::from_pkcs1_der(&raw).map_err(|_| ToolError::InvalidKey)?;
            CachedKeys::public_only(raw)
        } else {
            let private = RsaPrivateKey::from_pkcs1_der(&raw).map_err(|_| ToolError::InvalidKey)?;
            private.validate().map_err(|_| ToolError::InvalidKey)?;
            let public_der = RsaPublicKey::from(&private)
                .to_pkcs1_der()
                .map_err(|_| ToolError::InvalidKey)?
                .as_bytes()
                .to_vec();
            CachedKeys::pair(public_der, raw)
        };
        slot.set_cached_keys(keys);
        Ok(())
    }

    fn store_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        let keys = slot.cached_keys().ok_or(ToolError::InvalidKey)?;
        let (stored, public) = match &keys.private {
            Some(private_der) => (encode_stored_key(&[private_der]), false),
            None => (encode_stored_key(&[&keys.public]), true),
        };
        slot.set_stored_key(stored, public);
        Ok(())
    }

    fn security_level(&self, slot: Option<&dyn KeySlot>) -> Result<Option<i32>, ToolError> {
        let Some(slot) = slot else {
            return Ok(Some(0)); // not applicable without a signet
        };
        let public = public_key(slot)?;
        Ok(Some(level_by_modulus_bits(public.size() * 8)))
    }
}

fn generate_with_bits(slot: &mut dyn KeySlot, bits: usize) -> Result<(), ToolError> {
    let private = RsaPrivateKey::new(&mut JessRng, bits)
        .map_err(|err| ToolError::op("RSA-OAEP", err.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let private_der =
        private.to_pkcs1_der().map_err(|_| ToolError::InvalidKey)?.as_bytes().to_vec();
    let public_der =
        public.to_pkcs1_der().map_err(|_| ToolError::InvalidKey)?.as_bytes().to_vec();
    slot.set_cached_keys(CachedKeys::pair(public_der, private_der));
    Ok(())
}

fn level_by_modulus_bits(bits: usize) -> i32 {
    match bits {
        b if b >= 15360 => 256,
        b if b >= 7680 => 192,
        b if b >= 3072 => 128,
        b if b >= 2048 => 112,
        b if b >= 1024 => 80,
        b if b >= 512 => 56,
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::get_hash_tool;
    use crate::logic::tests_support::TestSlot;

    // 2048 bit test keys keep debug-mode key generation bearable.
    fn generated_slot() -> TestSlot {
        let mut slot = TestSlot::new("RSA-OAEP");
        generate_with_bits(&mut slot, 2048).unwrap();
        slot
    }

    #[test]
    fn wrap_and_unwrap_roundtrip() {
        let slot = generated_slot();
        let oaep = RsaOaep { hash: get_hash_tool("SHA2-256").unwrap() };

        let key = [0xA5u8; 32];
        let wrapped = oaep.encapsulate_key(&key, &slot).unwrap();
        assert_ne!(wrapped.as_slice(), key.as_slice());

        let unwrapped = oaep.unwrap_key(&wrapped, &slot).unwrap();
        assert_eq!(unwrapped, key);

        let other = generated_slot();
        assert!(oaep.unwrap_key(&wrapped, &other).is_err(), "wrong key must not unwrap");
    }

    #[test]
    fn security_level_follows_modulus() {
        assert_eq!(level_by_modulus_bits(2048), 112);
        assert_eq!(level_by_modulus_bits(3072), 128);
        assert_eq!(level_by_modulus_bits(7680), 192);
        assert_eq!(level_by_modulus_bits(256), -1);
    }
}
