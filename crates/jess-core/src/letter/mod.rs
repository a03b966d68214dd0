//! Letters: the cryptographic message format.
//!
//! A letter carries everything needed to open it again: suite id, nonce,
//! key seals, ciphertext, MAC, and signatures. Selected fields are bound
//! into MACs, AEADs, and signatures through a canonical associated-data
//! encoding with stable field ids.

mod file;
mod wire;

use serde::{Deserialize, Serialize};

use crate::container::Container;
use crate::envelope::Envelope;
use crate::requirements::{Requirement, Requirements};
use crate::session::Session;
use crate::signet::{Signet, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD};
use crate::truststore::TrustStore;
use crate::JessError;

/// The data format for encrypted data at rest or in transit.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Letter {
    /// Letter version. Signed and MAC'd; absent on wire messages after the
    /// handshake.
    #[serde(rename = "Version")]
    pub version: u8,

    /// Suite id. Signed and MAC'd; absent on wire messages after the
    /// handshake.
    #[serde(rename = "SuiteID", skip_serializing_if = "String::is_empty")]
    pub suite_id: String,

    /// Per-message nonce. Signed and MAC'd.
    #[serde(rename = "Nonce", skip_serializing_if = "Vec::is_empty")]
    pub nonce: Vec<u8>,

    /// Key seals in tool queue order. Signed and MAC'd.
    #[serde(rename = "Keys", skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Seal>,

    /// Ciphertext (or plain data for signature-only letters).
    #[serde(rename = "Data", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,

    /// Concatenated MAC blocks. Signed.
    #[serde(rename = "Mac", skip_serializing_if = "Vec::is_empty")]
    pub mac: Vec<u8>,

    /// Signatures in sender order.
    #[serde(rename = "Signatures", skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Seal>,

    /// Wire flag: this message carries the rekey apply marker. MAC'd.
    #[serde(rename = "ApplyKeys", skip_serializing_if = "std::ops::Not::not")]
    pub apply_keys: bool,
}

/// A key, key exchange, or signature within a letter.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Seal {
    /// Tool name for reference seals and signatures.
    #[serde(rename = "Scheme", skip_serializing_if = "String::is_empty")]
    pub scheme: String,

    /// Key establishment: signet id of the recipient's signet.
    /// Signature: signet id of the signer's signet.
    #[serde(rename = "ID", skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Key establishment: public key or wrapped key.
    /// Signature: signature value.
    #[serde(rename = "Value", skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<u8>,
}

// Field ids for associated data. These ids MUST NOT change.
const FIELD_ID_LETTER_VERSION: u64 = 1;
const FIELD_ID_LETTER_SUITE_ID: u64 = 2;
const FIELD_ID_LETTER_NONCE: u64 = 3;
const FIELD_ID_LETTER_KEYS: u64 = 4;
const FIELD_ID_LETTER_MAC: u64 = 5;

const FIELD_ID_SEAL_SCHEME: u64 = 16;
const FIELD_ID_SEAL_ID: u64 = 17;
const FIELD_ID_SEAL_VALUE: u64 = 18;

impl Letter {
    /// Serializes the letter to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, JessError> {
        serde_json::to_vec(self)
            .map_err(|err| JessError::format(format!("failed to serialize letter: {err}")))
    }

    /// Parses a JSON-serialized letter.
    pub fn from_json(data: &[u8]) -> Result<Letter, JessError> {
        serde_json::from_slice(data)
            .map_err(|err| JessError::format(format!("failed to parse letter: {err}")))
    }

    /// Builds an envelope from the letter, configured for opening it.
    ///
    /// Seals referring to local secrets become secret stubs, value seals
    /// become recipient stubs, and signatures become sender stubs; the
    /// actual signets are resolved against a trust store during signet
    /// preparation.
    pub fn envelope(&self, requirements: Option<Requirements>) -> Result<Envelope, JessError> {
        if self.version == 0 {
            return Err(JessError::format("letter does not specify version"));
        }
        if self.suite_id.is_empty() {
            return Err(JessError::format("letter does not specify a suite"));
        }

        let mut envelope = Envelope {
            version: self.version,
            suite_id: self.suite_id.clone(),
            ..Envelope::default()
        };
        envelope.load_suite()?;

        // Default to full requirements.
        let requirements = requirements.unwrap_or_else(Requirements::all);
        envelope
            .suite()
            .expect("suite was just loaded")
            .provides
            .check_compliance_to(requirements)
            .map_err(|missing| JessError::UnmetRequirements { missing })?;

        for seal in &self.keys {
            // Handshake messages carry ephemeral keys without an id in the
            // first message; only reference seals become envelope entries.
            if seal.id.is_empty() {
                continue;
            }
            let stub = Signet::stub(self.version, &seal.id, &seal.scheme);
            if seal.scheme == SIGNET_SCHEME_KEY || seal.scheme == SIGNET_SCHEME_PASSWORD {
                envelope.secrets.push(stub);
            } else {
                envelope.recipients.push(stub);
            }
        }
        for seal in &self.signatures {
            envelope.senders.push(Signet::stub(self.version, &seal.id, &seal.scheme));
        }

        envelope.set_opening(true);
        Ok(envelope)
    }

    /// Creates a session and opens the letter in one step.
    pub fn open(
        &self,
        requirements: Option<Requirements>,
        trust_store: &dyn TrustStore,
    ) -> Result<Vec<u8>, JessError> {
        let envelope = self.envelope(requirements)?;
        let mut session = envelope.correspondence(trust_store)?;
        session.open(self)
    }

    /// Creates a session and verifies the letter's signatures in one step.
    pub fn verify(
        &self,
        requirements: Option<Requirements>,
        trust_store: &dyn TrustStore,
    ) -> Result<(), JessError> {
        let envelope = self.envelope(requirements)?;
        let mut session = envelope.verifying_correspondence(trust_store)?;
        session.verify(self)
    }

    /// Creates a wire session from the first letter of a correspondence.
    pub fn wire_correspondence(
        &self,
        trust_store: &dyn TrustStore,
    ) -> Result<Session, JessError> {
        let envelope = self.envelope(Some(
            Requirements::all().without(Requirement::SenderAuthentication),
        ))?;
        envelope.wire_correspondence(trust_store)
    }

    /// Compiles the canonical associated data blob.
    ///
    /// Every present field is encoded as its stable field id followed by
    /// the value; new fields can be added without versioning concerns.
    pub(crate) fn compile_associated_data(&self) -> Vec<u8> {
        let mut c = Container::new();

        if self.version > 0 {
            c.append_number(FIELD_ID_LETTER_VERSION);
            c.append_number(u64::from(self.version));
        }
        if !self.suite_id.is_empty() {
            c.append_number(FIELD_ID_LETTER_SUITE_ID);
            c.append_block(self.suite_id.as_bytes());
        }
        if !self.nonce.is_empty() {
            c.append_number(FIELD_ID_LETTER_NONCE);
            c.append_block(&self.nonce);
        }
        if !self.keys.is_empty() {
            c.append_number(FIELD_ID_LETTER_KEYS);
            c.append_number(self.keys.len() as u64);
            for (index, seal) in self.keys.iter().enumerate() {
                c.append_number(index as u64);
                seal.compile_associated_data(&mut c);
            }
        }

        c.into_inner()
    }

    /// Compiles the associated data bound into signatures: the MAC
    /// associated data followed by the MAC itself.
    pub(crate) fn compile_associated_signing_data(&self, associated_data: Vec<u8>) -> Vec<u8> {
        let mut data = if associated_data.is_empty() {
            self.compile_associated_data()
        } else {
            associated_data
        };

        if self.mac.is_empty() {
            return data;
        }

        let mut c = Container::new();
        c.append_raw(&data);
        c.append_number(FIELD_ID_LETTER_MAC);
        c.append_block(&self.mac);
        data = c.into_inner();
        data
    }
}

impl Seal {
    fn compile_associated_data(&self, c: &mut Container) {
        if !self.scheme.is_empty() {
            c.append_number(FIELD_ID_SEAL_SCHEME);
            c.append_block(self.scheme.as_bytes());
        }
        if !self.id.is_empty() {
            c.append_number(FIELD_ID_SEAL_ID);
            c.append_block(self.id.as_bytes());
        }
        if !self.value.is_empty() {
            c.append_number(FIELD_ID_SEAL_VALUE);
            c.append_block(&self.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_letter() -> Letter {
        Letter {
            version: 1,
            suite_id: "key_v1".into(),
            nonce: vec![1, 2, 3, 4],
            keys: vec![Seal { scheme: "key".into(), id: "test-key-1".into(), value: vec![] }],
            data: vec![0xAA; 16],
            mac: vec![0xBB; 32],
            signatures: vec![],
            apply_keys: false,
        }
    }

    #[test]
    fn json_roundtrip() {
        let letter = sample_letter();
        let encoded = letter.to_json().unwrap();
        let decoded = Letter::from_json(&encoded).unwrap();
        assert_eq!(letter, decoded);
    }

    #[test]
    fn associated_data_is_stable() {
        let letter = sample_letter();
        assert_eq!(letter.compile_associated_data(), letter.compile_associated_data());
    }

    #[test]
    fn associated_data_covers_every_bound_field() {
        let base = sample_letter();
        let base_aad = base.compile_associated_data();

        let mut changed = base.clone();
        changed.nonce[0] ^= 1;
        assert_ne!(base_aad, changed.compile_associated_data(), "nonce not bound");

        let mut changed = base.clone();
        changed.suite_id = "pw_v1".into();
        assert_ne!(base_aad, changed.compile_associated_data(), "suite id not bound");

        let mut changed = base.clone();
        changed.keys[0].id = "other".into();
        assert_ne!(base_aad, changed.compile_associated_data(), "seal id not bound");

        // The MAC is only bound into the signing associated data.
        let mut changed = base.clone();
        changed.mac[0] ^= 1;
        assert_eq!(base_aad, changed.compile_associated_data());
        assert_ne!(
            base.compile_associated_signing_data(base_aad.clone()),
            changed.compile_associated_signing_data(base_aad.clone())
        );
    }

    #[test]
    fn signing_data_without_mac_equals_base() {
        let mut letter = sample_letter();
        letter.mac.clear();
        let aad = letter.compile_associated_data();
        assert_eq!(letter.compile_associated_signing_data(aad.clone()), aad);
    }

    #[test]
    fn envelope_reconstruction_sorts_seals() {
        let mut letter = sample_letter();
        letter.keys.push(Seal { id: "rcpt-1".into(), value: vec![9; 32], ..Seal::default() });
        letter.keys.push(Seal { value: vec![8; 32], ..Seal::default() }); // ephemeral, no id
        letter.signatures.push(Seal {
            scheme: "Ed25519".into(),
            id: "sender-1".into(),
            value: vec![7; 64],
        });

        let envelope = letter.envelope(None).unwrap();
        assert_eq!(envelope.secrets.len(), 1);
        assert_eq!(envelope.secrets[0].id, "test-key-1");
        assert_eq!(envelope.recipients.len(), 1);
        assert_eq!(envelope.recipients[0].id, "rcpt-1");
        assert_eq!(envelope.senders.len(), 1);
        assert_eq!(envelope.senders[0].scheme, "Ed25519");
    }

    #[test]
    fn envelope_requires_version_and_suite() {
        let mut letter = sample_letter();
        letter.version = 0;
        assert!(letter.envelope(None).is_err());

        let mut letter = sample_letter();
        letter.suite_id.clear();
        assert!(letter.envelope(None).is_err());
    }
}
