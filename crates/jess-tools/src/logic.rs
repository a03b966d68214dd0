//! The tool logic contract.
//!
//! Each purpose gets its own trait with exactly the methods it needs; the
//! [`ToolInstance`] enum tags a fresh logic instance with its purpose so the
//! session compiler can sort instances into typed queues. Key management is
//! separate: [`KeyHandler`] operations are stateless and run on the
//! registry's static handler, against any [`KeySlot`] implementation.

use std::sync::atomic::{compiler_fence, Ordering};

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::random;
use crate::tool::ToolInfo;
use crate::ToolError;

/// Overwrites the buffer with `0xFF` bytes.
///
/// Best effort: the compiler fence keeps the writes from being elided as
/// dead stores, but copies the data may have left elsewhere (reallocations,
/// registers) are out of reach.
pub fn burn_bytes(buf: &mut [u8]) {
    buf.fill(0xFF);
    compiler_fence(Ordering::SeqCst);
}

/// Parsed native key material cached on a signet.
///
/// Both halves are the primitive's raw byte representation; parsing into the
/// primitive's own types happens at call time. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CachedKeys {
    /// Raw public key bytes.
    pub public: Vec<u8>,
    /// Raw private key bytes, absent on public-only signets.
    pub private: Option<Vec<u8>>,
}

impl CachedKeys {
    /// Cache holding both halves of a key pair.
    pub fn pair(public: Vec<u8>, private: Vec<u8>) -> Self {
        Self { public, private: Some(private) }
    }

    /// Cache holding only the public half.
    pub fn public_only(public: Vec<u8>) -> Self {
        Self { public, private: None }
    }
}

impl std::fmt::Debug for CachedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("CachedKeys")
            .field("public_len", &self.public.len())
            .field("private", &self.private.is_some())
            .finish()
    }
}

/// Access to a signet's key storage, as seen by tools.
///
/// `jess-core`'s signet type implements this; the indirection keeps the tool
/// adapters free of a dependency on the session layer.
pub trait KeySlot {
    /// The tool name (or reserved scheme) this slot's key belongs to.
    fn scheme(&self) -> &str;

    /// The serialized key and whether it is the public half only.
    fn stored_key(&self) -> (&[u8], bool);

    /// Replaces the serialized key.
    fn set_stored_key(&mut self, key: Vec<u8>, public: bool);

    /// The parsed native key material, if loaded.
    fn cached_keys(&self) -> Option<&CachedKeys>;

    /// Stores parsed native key material.
    fn set_cached_keys(&mut self, keys: CachedKeys);

    /// Destroys stored and cached key material, best effort.
    fn burn(&mut self);
}

/// Stateless key management for tools that own key pairs.
///
/// All operations must work without a session: they run on the registry's
/// static handler during key generation, trust store loading, and security
/// level queries.
pub trait KeyHandler: Send + Sync {
    /// Generates a new key pair into the slot's cache.
    fn generate_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError>;

    /// Parses the stored key into the slot's cache. If the slot is marked
    /// public, only the public half is expected.
    fn load_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError>;

    /// Serializes cached key material into the slot's storage. If no private
    /// half is cached, only the public key is stored.
    fn store_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError>;

    /// Destroys the slot's key material, best effort.
    fn burn_key(&self, slot: &mut dyn KeySlot) -> Result<(), ToolError> {
        slot.burn();
        Ok(())
    }

    /// Key-specific security level. `None` defers to the generic
    /// tool-and-hash calculation, a negative value marks the key as broken.
    fn security_level(&self, slot: Option<&dyn KeySlot>) -> Result<Option<i32>, ToolError> {
        let _ = slot;
        Ok(None)
    }
}

/// Session services available to tools during `setup`.
///
/// A helper is a short-lived view borrowed from the session for the duration
/// of one setup call; tools must not retain it.
pub struct Helper<'a> {
    kdf: Option<&'a mut dyn KeyDeriver>,
    info: &'a ToolInfo,
    default_symmetric_key_size: usize,
    security_level: i32,
    max_security_level: i32,
}

impl<'a> Helper<'a> {
    /// Creates a helper view for one tool.
    pub fn new(
        kdf: Option<&'a mut dyn KeyDeriver>,
        info: &'a ToolInfo,
        default_symmetric_key_size: usize,
        security_level: i32,
        max_security_level: i32,
    ) -> Self {
        Self { kdf, info, default_symmetric_key_size, security_level, max_security_level }
    }

    /// Derives a new session key in the tool's declared key size.
    pub fn new_session_key(&mut self) -> Result<Vec<u8>, ToolError> {
        let size =
            if self.info.key_size > 0 { self.info.key_size } else { self.default_symmetric_key_size };
        self.kdf.as_mut().ok_or(ToolError::KdfNotInitialized)?.derive_key(size)
    }

    /// Derives a new session nonce in the tool's declared nonce size.
    pub fn new_session_nonce(&mut self) -> Result<Vec<u8>, ToolError> {
        let size = if self.info.nonce_size > 0 {
            self.info.nonce_size
        } else {
            self.default_symmetric_key_size
        };
        self.kdf.as_mut().ok_or(ToolError::KdfNotInitialized)?.derive_key(size)
    }

    /// Fills the given buffer with derived key material.
    pub fn fill_new_session_key(&mut self, key: &mut [u8]) -> Result<(), ToolError> {
        self.kdf.as_mut().ok_or(ToolError::KdfNotInitialized)?.derive_key_into(key)
    }

    /// Returns the requested amount of random bytes.
    pub fn random_bytes(&self, n: usize) -> Result<Vec<u8>, ToolError> {
        random::random_bytes(n)
    }

    /// Destroys the given buffer, best effort.
    pub fn burn(&self, data: &mut [u8]) {
        burn_bytes(data);
    }

    /// The default symmetric key size of the session, in bytes.
    pub fn default_symmetric_key_size(&self) -> usize {
        self.default_symmetric_key_size
    }

    /// The effective (lowest) security level of the session.
    pub fn security_level(&self) -> i32 {
        self.security_level
    }

    /// The highest security level observed in the session.
    pub fn max_security_level(&self) -> i32 {
        self.max_security_level
    }
}

/// Key derivation: turns established key material into per-message subkeys.
///
/// The derivation is a stream; every call consumes exactly the requested
/// byte count, so the order of calls is part of the protocol.
pub trait KeyDeriver: Send {
    /// Initializes the derivation stream with a nonce and key material.
    fn init_key_derivation(&mut self, nonce: &[u8], material: &[&[u8]]) -> Result<(), ToolError>;

    /// Derives `size` bytes from the stream.
    fn derive_key(&mut self, size: usize) -> Result<Vec<u8>, ToolError> {
        let mut key = vec![0u8; size];
        self.derive_key_into(&mut key)?;
        Ok(key)
    }

    /// Derives key material from the stream into the given buffer.
    fn derive_key_into(&mut self, out: &mut [u8]) -> Result<(), ToolError>;
}

/// Password derivation: turns a password into a secure key.
pub trait PassDeriver: Send {
    /// Derives `key_size` bytes from the password and salt.
    fn derive_key_from_password(
        &mut self,
        password: &[u8],
        salt: &[u8],
        key_size: usize,
    ) -> Result<Vec<u8>, ToolError>;
}

/// DH-style key exchange.
pub trait KeyExchanger: Send {
    /// Computes the shared secret from a local private and a remote public
    /// signet. Both slots must have their keys loaded.
    fn make_shared_key(
        &self,
        local: &dyn KeySlot,
        remote: &dyn KeySlot,
    ) -> Result<Vec<u8>, ToolError>;
}

/// Key encapsulation: wraps a symmetric key with a public key.
pub trait KeyEncapsulator: Send {
    /// Wraps the key under the remote public signet.
    fn encapsulate_key(&self, key: &[u8], remote: &dyn KeySlot) -> Result<Vec<u8>, ToolError>;

    /// Unwraps a wrapped key with the local private signet.
    fn unwrap_key(&self, wrapped: &[u8], local: &dyn KeySlot) -> Result<Vec<u8>, ToolError>;
}

/// Message signing and verification.
pub trait Signer: Send {
    /// Signs the data with the local private signet. Tools using a managed
    /// hasher receive the finished hash sum instead of re-reading the data.
    fn sign(
        &self,
        data: &[u8],
        associated_data: &[u8],
        managed_sum: Option<&[u8]>,
        local: &dyn KeySlot,
    ) -> Result<Vec<u8>, ToolError>;

    /// Verifies a signature with the remote public signet.
    fn verify(
        &self,
        data: &[u8],
        associated_data: &[u8],
        managed_sum: Option<&[u8]>,
        signature: &[u8],
        remote: &dyn KeySlot,
    ) -> Result<(), ToolError>;
}

/// Authenticated encryption with associated data.
pub trait IntegratedCipher: Send {
    /// Pulls per-message subkeys from the helper. Runs before first use.
    fn setup(&mut self, helper: &mut Helper<'_>) -> Result<(), ToolError> {
        let _ = helper;
        Ok(())
    }

    /// Burns per-message state. Runs after every operation.
    fn reset(&mut self) -> Result<(), ToolError> {
        Ok(())
    }

    /// Encrypts and authenticates data and associated data.
    fn authenticated_encrypt(
        &mut self,
        data: Vec<u8>,
        associated_data: &[u8],
    ) -> Result<Vec<u8>, ToolError>;

    /// Decrypts and authenticates data and associated data.
    fn authenticated_decrypt(
        &mut self,
        data: Vec<u8>,
        associated_data: &[u8],
    ) -> Result<Vec<u8>, ToolError>;
}

/// Plain encryption without integrity protection.
pub trait Cipher: Send {
    /// Pulls per-message subkeys from the helper. Runs before first use.
    fn setup(&mut self, helper: &mut Helper<'_>) -> Result<(), ToolError> {
        let _ = helper;
        Ok(())
    }

    /// Burns per-message state. Runs after every operation.
    fn reset(&mut self) -> Result<(), ToolError> {
        Ok(())
    }

    /// Encrypts the data.
    fn encrypt(&mut self, data: Vec<u8>) -> Result<Vec<u8>, ToolError>;

    /// Decrypts the data.
    fn decrypt(&mut self, data: Vec<u8>) -> Result<Vec<u8>, ToolError>;
}

/// Message authentication codes.
pub trait Mac: Send {
    /// Pulls per-message subkeys from the helper. Runs before first use.
    fn setup(&mut self, helper: &mut Helper<'_>) -> Result<(), ToolError> {
        let _ = helper;
        Ok(())
    }

    /// Burns per-message state. Runs after every operation.
    fn reset(&mut self) -> Result<(), ToolError> {
        Ok(())
    }

    /// Computes the authentication code over data and associated data. Tools
    /// using a managed hasher receive the finished sum of both.
    fn mac(
        &mut self,
        data: &[u8],
        associated_data: &[u8],
        managed_sum: Option<&[u8]>,
    ) -> Result<Vec<u8>, ToolError>;
}

/// A fresh tool logic instance, tagged by purpose.
pub enum ToolInstance {
    /// Key derivation logic.
    KeyDeriver(Box<dyn KeyDeriver>),
    /// Password derivation logic.
    PassDeriver(Box<dyn PassDeriver>),
    /// Key exchange logic.
    KeyExchanger(Box<dyn KeyExchanger>),
    /// Key encapsulation logic.
    KeyEncapsulator(Box<dyn KeyEncapsulator>),
    /// Signing logic.
    Signer(Box<dyn Signer>),
    /// AEAD logic.
    IntegratedCipher(Box<dyn IntegratedCipher>),
    /// Plain cipher logic.
    Cipher(Box<dyn Cipher>),
    /// MAC logic.
    Mac(Box<dyn Mac>),
}

/// Serialization version prefixed to every stored key.
const KEY_STORAGE_VERSION: u8 = 1;

/// Encodes raw key parts into the versioned storage format.
pub(crate) fn encode_stored_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + parts.iter().map(|p| p.len()).sum::<usize>());
    out.push(KEY_STORAGE_VERSION);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// Decodes the versioned storage format back into the raw key bytes.
pub(crate) fn decode_stored_key(stored: &[u8]) -> Result<&[u8], ToolError> {
    match stored.split_first() {
        Some((&KEY_STORAGE_VERSION, rest)) => Ok(rest),
        _ => Err(ToolError::InvalidKey),
    }
}

/// Returns the loaded cache of a slot, or `InvalidKey` if nothing is loaded.
pub(crate) fn cached(slot: &dyn KeySlot) -> Result<&CachedKeys, ToolError> {
    slot.cached_keys().ok_or(ToolError::InvalidKey)
}

/// Returns the loaded private key of a slot.
pub(crate) fn cached_private(slot: &dyn KeySlot) -> Result<&[u8], ToolError> {
    cached(slot)?.private.as_deref().ok_or(ToolError::InvalidKey)
}

/// Returns the loaded public key of a slot.
pub(crate) fn cached_public(slot: &dyn KeySlot) -> Result<&[u8], ToolError> {
    let keys = cached(slot)?;
    if keys.public.is_empty() {
        return Err(ToolError::InvalidKey);
    }
    Ok(&keys.public)
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// Minimal key slot for exercising key handlers without a signet.
    pub(crate) struct TestSlot {
        pub scheme: &'static str,
        pub stored: Vec<u8>,
        pub public: bool,
        pub cached: Option<CachedKeys>,
    }

    impl TestSlot {
        pub(crate) fn new(scheme: &'static str) -> Self {
            Self { scheme, stored: Vec::new(), public: false, cached: None }
        }
    }

    impl KeySlot for TestSlot {
        fn scheme(&self) -> &str {
            self.scheme
        }

        fn stored_key(&self) -> (&[u8], bool) {
            (&self.stored, self.public)
        }

        fn set_stored_key(&mut self, key: Vec<u8>, public: bool) {
            self.stored = key;
            self.public = public;
        }

        fn cached_keys(&self) -> Option<&CachedKeys> {
            self.cached.as_ref()
        }

        fn set_cached_keys(&mut self, keys: CachedKeys) {
            self.cached = Some(keys);
        }

        fn burn(&mut self) {
            burn_bytes(&mut self.stored);
            self.stored.clear();
            self.cached = None;
        }
    }
}
