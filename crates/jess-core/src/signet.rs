//! Signets: cryptographic identities.
//!
//! A signet wraps a key pair, a symmetric key, or a password under a stable
//! id. The serialized form stores only the tool's storage format; parsed
//! native key material lives in a non-serialized cache slot that tools fill
//! via [`Signet::load_key`].
//!
//! # Security
//!
//! - A signet with `public == true` never carries private material;
//!   [`Signet::as_recipient`] strips the private half and the
//!   self-signature.
//! - [`Signet::burn`] destroys stored and cached key material, best effort.

use jess_tools::{burn_bytes, CachedKeys, KeySlot, Purpose, Tool};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::letter::Letter;
use crate::JessError;

/// Reserved scheme for password signets.
pub const SIGNET_SCHEME_PASSWORD: &str = "pw";
/// Reserved scheme for symmetric key signets.
pub const SIGNET_SCHEME_KEY: &str = "key";

/// A cryptographic identity: key pair, symmetric key, or password.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Signet {
    /// Serialization version.
    #[serde(rename = "Version")]
    pub version: u8,

    /// Stable id, referenced by envelopes and seals.
    #[serde(rename = "ID", skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Tool name, or one of the reserved schemes `pw` and `key`.
    #[serde(rename = "Scheme", skip_serializing_if = "String::is_empty")]
    pub scheme: String,

    /// Serialized key material in the tool's storage format. For password
    /// signets this holds the password and is never exported.
    #[serde(rename = "Key", skip_serializing_if = "Vec::is_empty")]
    pub key: Vec<u8>,

    /// The stored key is the public half of a key pair.
    #[serde(rename = "Public", skip_serializing_if = "std::ops::Not::not")]
    pub public: bool,

    /// The key is additionally wrapped in a letter closed with this
    /// envelope.
    #[serde(rename = "Protection", skip_serializing_if = "Option::is_none")]
    pub protection: Option<Box<Envelope>>,

    /// Human readable metadata.
    #[serde(rename = "Info", skip_serializing_if = "Option::is_none")]
    pub info: Option<SignetInfo>,

    /// Self-signature over the signet.
    #[serde(rename = "Signature", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Box<Letter>>,

    #[serde(skip)]
    pub(crate) cached: Option<CachedKeys>,
}

/// Human readable metadata about a signet.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SignetInfo {
    /// Display name.
    #[serde(rename = "Name", skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Owner of the signet.
    #[serde(rename = "Owner", skip_serializing_if = "String::is_empty")]
    pub owner: String,
    /// Creation time as unix seconds.
    #[serde(rename = "Created", skip_serializing_if = "is_zero")]
    pub created: u64,
    /// Expiry time as unix seconds, zero if unset.
    #[serde(rename = "Expires", skip_serializing_if = "is_zero")]
    pub expires: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl Signet {
    /// Creates a new signet base for the given scheme, without a key.
    pub fn new_base(scheme: &str) -> Self {
        Self { version: 1, scheme: scheme.to_string(), ..Self::default() }
    }

    /// Creates a reference stub carrying only version, id, and scheme.
    pub fn stub(version: u8, id: &str, scheme: &str) -> Self {
        Self { version, id: id.to_string(), scheme: scheme.to_string(), ..Self::default() }
    }

    /// Creates a symmetric key signet wrapping the given raw key.
    pub fn key_signet(id: &str, key: Vec<u8>) -> Self {
        Self {
            version: 1,
            id: id.to_string(),
            scheme: SIGNET_SCHEME_KEY.to_string(),
            key,
            ..Self::default()
        }
    }

    /// Creates a password signet wrapping the given password.
    pub fn password_signet(id: &str, password: &[u8]) -> Self {
        Self {
            version: 1,
            id: id.to_string(),
            scheme: SIGNET_SCHEME_PASSWORD.to_string(),
            key: password.to_vec(),
            ..Self::default()
        }
    }

    /// Returns the registered tool backing this signet's scheme.
    pub fn tool(&self) -> Result<&'static Tool, JessError> {
        Ok(jess_tools::get(&self.scheme)?)
    }

    /// Generates a new key pair. Refuses if key material is already present.
    pub fn generate_key(&mut self) -> Result<(), JessError> {
        if !self.key.is_empty() || self.cached.is_some() {
            return Err(JessError::config("cannot generate key: key already present"));
        }

        let tool = self.tool()?;
        let handler = match tool.info.purpose {
            Purpose::KeyExchange | Purpose::KeyEncapsulation | Purpose::Signing => tool
                .key_handler
                .ok_or_else(|| {
                    JessError::config(format!("tool {} has no key handler", tool.info.name))
                })?,
            _ => {
                return Err(JessError::config(format!(
                    "tool {} does not use signets",
                    tool.info.name
                )))
            }
        };
        handler.generate_key(self)?;
        Ok(())
    }

    /// Parses the stored key into the cache. No-op if already loaded.
    pub fn load_key(&mut self) -> Result<(), JessError> {
        if self.cached.is_some() {
            return Ok(());
        }
        if self.protection.is_some() {
            return Err(jess_tools::ToolError::Protected.into());
        }

        let tool = self.tool()?;
        let handler = tool
            .key_handler
            .ok_or_else(|| JessError::config(format!("tool {} has no key handler", tool.info.name)))?;
        handler.load_key(self)?;
        Ok(())
    }

    /// Serializes the cached key pair into storage. No-op if already stored.
    pub fn store_key(&mut self) -> Result<(), JessError> {
        if !self.key.is_empty() {
            return Ok(());
        }

        let tool = self.tool()?;
        let handler = tool
            .key_handler
            .ok_or_else(|| JessError::config(format!("tool {} has no key handler", tool.info.name)))?;
        handler.store_key(self)?;
        Ok(())
    }

    /// Returns the public projection of this signet.
    ///
    /// The private half, protection, and self-signature are stripped; the
    /// stored key is left empty for the caller to serialize.
    pub fn as_recipient(&self) -> Result<Signet, JessError> {
        match self.scheme.as_str() {
            SIGNET_SCHEME_KEY => {
                return Err(JessError::config("keys cannot be a recipient"));
            }
            SIGNET_SCHEME_PASSWORD => {
                return Err(JessError::config("passwords cannot be a recipient"));
            }
            _ => {}
        }

        // Load so the key halves can be split.
        let mut loaded = self.clone();
        loaded.load_key()?;
        let cached = loaded.cached.take().expect("load_key fills the cache");

        Ok(Signet {
            version: self.version,
            id: self.id.clone(),
            scheme: self.scheme.clone(),
            key: Vec::new(),
            public: true,
            protection: None,
            info: self.info.clone(),
            // The signature would be invalid without the private half.
            signature: None,
            cached: Some(CachedKeys::public_only(cached.public.clone())),
        })
    }

    /// Destroys all key material and renders the signet unusable, best
    /// effort.
    pub fn burn(&mut self) -> Result<(), JessError> {
        burn_bytes(&mut self.key);
        self.key.clear();
        self.cached = None;
        Ok(())
    }

    /// Assigns a fresh UUID as the signet id.
    pub fn assign_uuid(&mut self) -> Result<(), JessError> {
        let mut raw = [0u8; 16];
        jess_tools::random::fill_random(&mut raw)?;
        self.id = uuid::Builder::from_random_bytes(raw).into_uuid().to_string();
        Ok(())
    }

    /// Serializes the signet to CBOR, storing the key first if needed.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, JessError> {
        if self.key.is_empty() && self.cached.is_some() {
            self.store_key()?;
        }

        let mut data = Vec::new();
        ciborium::into_writer(self, &mut data)
            .map_err(|err| JessError::format(format!("failed to serialize signet: {err}")))?;
        Ok(data)
    }

    /// Parses a CBOR-serialized signet and loads its key.
    pub fn from_bytes(data: &[u8]) -> Result<Signet, JessError> {
        let mut signet: Signet = ciborium::from_reader(data)
            .map_err(|err| JessError::format(format!("failed to parse signet: {err}")))?;

        match signet.scheme.as_str() {
            SIGNET_SCHEME_KEY | SIGNET_SCHEME_PASSWORD => {}
            _ => signet.load_key()?,
        }
        Ok(signet)
    }

    /// Serializes the signet and encodes it with base58.
    pub fn to_base58(&mut self) -> Result<String, JessError> {
        Ok(bs58::encode(self.to_bytes()?).into_string())
    }

    /// Parses a base58 encoded serialized signet.
    pub fn from_base58(encoded: &str) -> Result<Signet, JessError> {
        let data = bs58::decode(encoded)
            .into_vec()
            .map_err(|err| JessError::format(format!("failed to decode base58: {err}")))?;
        Signet::from_bytes(&data)
    }

    /// Returns whether the private half is loaded.
    pub fn has_private_key(&self) -> bool {
        self.cached.as_ref().map_or(false, |keys| keys.private.is_some())
    }

    /// Returns whether any parsed key material is loaded.
    pub fn has_loaded_keys(&self) -> bool {
        self.cached.is_some()
    }
}

impl KeySlot for Signet {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn stored_key(&self) -> (&[u8], bool) {
        (&self.key, self.public)
    }

    fn set_stored_key(&mut self, key: Vec<u8>, public: bool) {
        self.key = key;
        self.public = public;
    }

    fn cached_keys(&self) -> Option<&CachedKeys> {
        self.cached.as_ref()
    }

    fn set_cached_keys(&mut self, keys: CachedKeys) {
        self.cached = Some(keys);
    }

    fn burn(&mut self) {
        let _ = Signet::burn(self);
    }
}

/// Generates a new signet with a freshly generated key for the given tool.
pub fn generate_signet(tool_id: &str) -> Result<Signet, JessError> {
    let tool = jess_tools::get(tool_id)?;
    let mut signet = Signet::new_base(tool.info.name);
    signet.generate_key()?;
    Ok(signet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_projection_is_public_only() {
        let signet = generate_signet("Ed25519").unwrap();
        let recipient = signet.as_recipient().unwrap();

        assert!(recipient.public);
        assert!(!recipient.has_private_key());
        assert!(recipient.signature.is_none());
    }

    #[test]
    fn recipient_survives_serialization_without_private_data() {
        let mut signet = generate_signet("ECDH-X25519").unwrap();
        signet.id = "test-x25519".into();

        let mut recipient = signet.as_recipient().unwrap();
        let encoded = recipient.to_base58().unwrap();
        let decoded = Signet::from_base58(&encoded).unwrap();

        assert!(decoded.public);
        assert!(!decoded.has_private_key());
        assert_eq!(decoded.id, "test-x25519");
        assert_eq!(decoded.scheme, "ECDH-X25519");
    }

    #[test]
    fn reserved_schemes_cannot_become_recipients() {
        let key = Signet { scheme: SIGNET_SCHEME_KEY.into(), ..Signet::default() };
        assert!(key.as_recipient().is_err());

        let password = Signet { scheme: SIGNET_SCHEME_PASSWORD.into(), ..Signet::default() };
        assert!(password.as_recipient().is_err());
    }

    #[test]
    fn generate_refuses_existing_key() {
        let mut signet = generate_signet("Ed25519").unwrap();
        assert!(signet.generate_key().is_err());
    }

    #[test]
    fn generate_refuses_non_signet_tools() {
        let mut signet = Signet::new_base("CHACHA20-POLY1305");
        assert!(signet.generate_key().is_err());
    }

    #[test]
    fn burn_clears_key_material() {
        let mut signet = generate_signet("Ed25519").unwrap();
        signet.store_key().unwrap();
        assert!(!signet.key.is_empty());

        Signet::burn(&mut signet).unwrap();
        assert!(signet.key.is_empty());
        assert!(!signet.has_private_key());
    }

    #[test]
    fn uuid_assignment_is_unique() {
        let mut a = Signet::new_base("Ed25519");
        let mut b = Signet::new_base("Ed25519");
        a.assign_uuid().unwrap();
        b.assign_uuid().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 36);
    }
}
