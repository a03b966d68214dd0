//! Envelopes: user-facing configuration for closing and opening letters.
//!
//! An envelope bundles a suite id with the signets taking part in a
//! correspondence. For users, envelopes describe how a letter is closed:
//! secrets and senders always refer to private material and recipients to
//! public keys in that context. When an envelope is reconstructed from a
//! letter for opening, the meaning of the slots flips, tracked by the
//! `opening` flag.

use serde::{Deserialize, Serialize};

use crate::password::{create_password_callback, get_password_callback};
use crate::session::Session;
use crate::signet::{Signet, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD};
use crate::suite::{get_suite, Suite};
use crate::truststore::TrustStore;
use crate::JessError;

/// Configuration for putting data into a letter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Envelope {
    /// Serialization version.
    #[serde(rename = "Version")]
    pub version: u8,

    /// User-chosen envelope name.
    #[serde(rename = "Name", skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Id of the suite to compile.
    #[serde(rename = "SuiteID")]
    pub suite_id: String,

    /// Secret keys and passwords.
    #[serde(rename = "Secrets", skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Signet>,

    /// Sender signets: private signing keys when closing, public
    /// verification keys when opening.
    #[serde(rename = "Senders", skip_serializing_if = "Vec::is_empty")]
    pub senders: Vec<Signet>,

    /// Recipient signets: public keys for key establishment when closing,
    /// the matching private keys when opening.
    #[serde(rename = "Recipients", skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Signet>,

    /// Minimum security level of the envelope when it was created.
    #[serde(rename = "SecurityLevel", skip_serializing_if = "is_zero")]
    pub security_level: i32,

    #[serde(skip)]
    pub(crate) suite: Option<&'static Suite>,

    #[serde(skip)]
    pub(crate) opening: bool,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

impl Envelope {
    /// Returns a new, slightly initialized envelope.
    pub fn new(suite_id: &str) -> Self {
        Self { version: 1, suite_id: suite_id.to_string(), ..Self::default() }
    }

    /// Returns a new session configured with this envelope.
    pub fn correspondence(&self, trust_store: &dyn TrustStore) -> Result<Session, JessError> {
        self.init_correspondence(trust_store, false)
    }

    /// Returns a new session configured for verification only.
    pub fn verifying_correspondence(
        &self,
        trust_store: &dyn TrustStore,
    ) -> Result<Session, JessError> {
        self.init_correspondence(trust_store, true)
    }

    fn init_correspondence(
        &self,
        trust_store: &dyn TrustStore,
        _verifying: bool,
    ) -> Result<Session, JessError> {
        let mut envelope = self.clone();
        envelope.load_suite()?;
        envelope.prepare_signets(trust_store)?;
        Session::new(envelope)
    }

    /// Returns a new wire session (live communication) configured with this
    /// envelope.
    pub fn wire_correspondence(&self, trust_store: &dyn TrustStore) -> Result<Session, JessError> {
        let mut session = self.correspondence(trust_store)?;
        session.init_wire_session()?;
        Ok(session)
    }

    /// Returns whether the envelope is valid and can be used as is.
    pub fn check(&self, trust_store: &dyn TrustStore) -> Result<(), JessError> {
        self.correspondence(trust_store).map(|_| ())
    }

    /// The resolved suite, if loaded.
    pub fn suite(&self) -> Option<&'static Suite> {
        self.suite
    }

    /// Loads the suite specified in the envelope.
    pub fn load_suite(&mut self) -> Result<(), JessError> {
        if self.suite.is_none() {
            let suite = get_suite(&self.suite_id).ok_or_else(|| {
                JessError::config(format!("suite {} does not exist", self.suite_id))
            })?;
            self.suite = Some(suite);
        }
        Ok(())
    }

    /// Marks the envelope as being used for opening a letter.
    pub(crate) fn set_opening(&mut self, opening: bool) {
        self.opening = opening;
    }

    /// Secrets of the given scheme, in envelope order.
    pub(crate) fn secrets_of<'a>(&'a self, scheme: &'a str) -> impl Iterator<Item = &'a Signet> {
        self.secrets.iter().filter(move |s| s.scheme == scheme)
    }

    /// Senders of the given scheme, in envelope order.
    pub(crate) fn senders_of<'a>(&'a self, scheme: &'a str) -> impl Iterator<Item = &'a Signet> {
        self.senders.iter().filter(move |s| s.scheme == scheme)
    }

    /// Recipients of the given scheme, in envelope order.
    pub(crate) fn recipients_of<'a>(&'a self, scheme: &'a str) -> impl Iterator<Item = &'a Signet> {
        self.recipients.iter().filter(move |s| s.scheme == scheme)
    }

    /// Checks that all signets of the envelope are ready to use, fetching
    /// referenced signets from the trust store and loading keys.
    pub fn prepare_signets(&mut self, trust_store: &dyn TrustStore) -> Result<(), JessError> {
        let opening = self.opening;
        let min_level = self.suite.map_or(0, |suite| suite.security_level);

        Self::prep_slot(&mut self.secrets, opening, trust_store, min_level)?;
        Self::prep_slot(&mut self.senders, opening, trust_store, min_level)?;
        Self::prep_slot(&mut self.recipients, !opening, trust_store, min_level)
    }

    fn prep_slot(
        signets: &mut [Signet],
        want_public: bool,
        trust_store: &dyn TrustStore,
        min_security_level: i32,
    ) -> Result<(), JessError> {
        for slot in signets.iter_mut() {
            if slot.key.is_empty() && !slot.has_loaded_keys() {
                if slot.scheme == SIGNET_SCHEME_PASSWORD {
                    // A stored password wins over prompting for one.
                    if !slot.id.is_empty() {
                        if let Ok(stored) = trust_store.get_signet(&slot.id, false) {
                            if stored.scheme == SIGNET_SCHEME_PASSWORD && !stored.key.is_empty() {
                                *slot = stored;
                                continue;
                            }
                        }
                    }
                    fill_password(slot, !want_public, trust_store, min_security_level)?;
                    continue;
                }

                // Keys are always secrets, never recipients.
                let want_public = if slot.scheme == SIGNET_SCHEME_KEY { false } else { want_public };

                // The signet is a reference, resolve it.
                if slot.id.is_empty() {
                    return Err(JessError::config("signets must have a scheme+key or an ID"));
                }
                let stored = trust_store.get_signet(&slot.id, want_public)?;

                if !slot.scheme.is_empty() && slot.scheme != stored.scheme {
                    return Err(JessError::config(format!(
                        "failed to apply signet with ID \"{}\": was expected to be of type {}, but is {}",
                        slot.id, slot.scheme, stored.scheme
                    )));
                }
                *slot = stored;
            }

            if slot.protection.is_some() {
                return Err(JessError::config("protected signets are not yet supported"));
            }

            match slot.scheme.as_str() {
                SIGNET_SCHEME_KEY | SIGNET_SCHEME_PASSWORD => {} // no loading needed
                _ => slot.load_key()?,
            }
        }
        Ok(())
    }

    /// Reduces all signets to `{version, id, scheme}` stubs, removing any
    /// key material. This prepares the envelope for serialization.
    pub fn clean_signets(&mut self) {
        for slot in [&mut self.secrets, &mut self.senders, &mut self.recipients] {
            for signet in slot.iter_mut() {
                *signet = Signet::stub(signet.version, &signet.id, &signet.scheme);
            }
        }
    }

    /// Serializes the envelope to CBOR, removing key material first.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, JessError> {
        self.clean_signets();

        let mut data = Vec::new();
        ciborium::into_writer(self, &mut data)
            .map_err(|err| JessError::format(format!("failed to serialize envelope: {err}")))?;
        Ok(data)
    }

    /// Parses a serialized envelope.
    pub fn from_bytes(data: &[u8]) -> Result<Envelope, JessError> {
        ciborium::from_reader(data)
            .map_err(|err| JessError::format(format!("failed to parse envelope: {err}")))
    }

    /// Serializes the envelope and encodes it with base58.
    pub fn to_base58(&mut self) -> Result<String, JessError> {
        Ok(bs58::encode(self.to_bytes()?).into_string())
    }

    /// Parses a base58 encoded serialized envelope.
    pub fn from_base58(encoded: &str) -> Result<Envelope, JessError> {
        let data = bs58::decode(encoded)
            .into_vec()
            .map_err(|err| JessError::format(format!("failed to decode base58: {err}")))?;
        Envelope::from_bytes(&data)
    }
}

fn fill_password(
    signet: &mut Signet,
    create_password: bool,
    trust_store: &dyn TrustStore,
    min_security_level: i32,
) -> Result<(), JessError> {
    if create_password {
        if create_password_callback().is_none() {
            return Ok(()); // checked again when the password is used
        }
    } else if get_password_callback().is_none() {
        return Ok(());
    }

    // Fill in the display name from the trust store so the prompt can name
    // the password.
    if signet.info.as_ref().map_or(true, |info| info.name.is_empty()) && !signet.id.is_empty() {
        if let Ok(stored) = trust_store.get_signet(&signet.id, false) {
            if let Some(info) = stored.info {
                signet.info = Some(info);
            }
        }
    }

    if create_password {
        create_password_callback().expect("checked above")(signet, min_security_level)
    } else {
        get_password_callback().expect("checked above")(signet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truststore::MemTrustStore;

    #[test]
    fn clean_signets_strips_key_material() {
        let mut envelope = Envelope::new("key_v1");
        envelope.secrets.push(Signet {
            version: 1,
            id: "k1".into(),
            scheme: SIGNET_SCHEME_KEY.into(),
            key: vec![1; 16],
            ..Signet::default()
        });

        envelope.clean_signets();
        assert!(envelope.secrets[0].key.is_empty());
        assert_eq!(envelope.secrets[0].id, "k1");
        assert_eq!(envelope.secrets[0].scheme, "key");
    }

    #[test]
    fn serialization_roundtrip_keeps_stubs_only() {
        let mut envelope = Envelope::new("key_v1");
        envelope.name = "backup".into();
        envelope.secrets.push(Signet {
            version: 1,
            id: "k1".into(),
            scheme: SIGNET_SCHEME_KEY.into(),
            key: vec![1; 16],
            ..Signet::default()
        });

        let encoded = envelope.to_base58().unwrap();
        let decoded = Envelope::from_base58(&encoded).unwrap();
        assert_eq!(decoded.name, "backup");
        assert_eq!(decoded.suite_id, "key_v1");
        assert_eq!(decoded.secrets.len(), 1);
        assert!(decoded.secrets[0].key.is_empty());
    }

    #[test]
    fn unknown_suite_is_rejected() {
        let mut envelope = Envelope::new("no_such_suite");
        assert!(envelope.load_suite().is_err());
    }

    #[test]
    fn referenced_signet_requires_an_id() {
        let store = MemTrustStore::new();
        let mut envelope = Envelope::new("key_v1");
        envelope.load_suite().unwrap();
        envelope.secrets.push(Signet::new_base(SIGNET_SCHEME_KEY));

        assert!(envelope.prepare_signets(&store).is_err());
    }

    #[test]
    fn missing_referenced_signet_fails() {
        let store = MemTrustStore::new();
        let mut envelope = Envelope::new("key_v1");
        envelope.load_suite().unwrap();
        envelope.secrets.push(Signet::stub(1, "ghost", SIGNET_SCHEME_KEY));

        assert!(matches!(
            envelope.prepare_signets(&store),
            Err(JessError::MissingSignet { .. })
        ));
    }

    #[test]
    fn scheme_mismatch_is_detected() {
        let store = MemTrustStore::new();
        store
            .store_signet(Signet {
                version: 1,
                id: "s1".into(),
                scheme: "ECDH-X25519".into(),
                key: vec![0; 16],
                ..Signet::default()
            })
            .unwrap();

        let mut envelope = Envelope::new("key_v1");
        envelope.load_suite().unwrap();
        envelope.secrets.push(Signet::stub(1, "s1", SIGNET_SCHEME_KEY));

        assert!(envelope.prepare_signets(&store).is_err());
    }
}
