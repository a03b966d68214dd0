//! Opening: verifying and decrypting a letter.
//!
//! Signatures are checked before tool setup and key derivation, so a
//! corrupt ciphertext with a valid outer signature is authenticated before
//! any secret key is loaded.

use subtle::ConstantTimeEq;

use crate::container::Container;
use crate::letter::Letter;
use crate::signet::{Signet, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD};
use crate::JessError;

use super::wire::{KePair, KxPair};
use super::{feed_managed, managed_sum, Session, WireSession};

impl Session {
    /// Decrypts (and possibly verifies) the given letter and returns the
    /// original data.
    ///
    /// The letter's seals are checked, the letter is opened, and the
    /// message returned.
    pub fn open(&mut self, letter: &Letter) -> Result<Vec<u8>, JessError> {
        let result = self.open_inner(letter);
        self.reset_managed_hashers();
        result
    }

    fn open_inner(&mut self, letter: &Letter) -> Result<Vec<u8>, JessError> {
        if self.wire.is_none() && letter.version != 1 {
            return Err(JessError::UnsupportedVersion(letter.version));
        }

        let associated_data = if !self.integrated_ciphers.is_empty() || !self.macs.is_empty() {
            letter.compile_associated_data()
        } else {
            Vec::new()
        };

        // Signatures first.
        if !self.signers.is_empty() {
            self.verify_signatures(letter, associated_data)?;
        }

        // End early if this is a signature-only letter.
        if self.kdf.is_none() {
            if !self.ciphers.is_empty()
                || !self.integrated_ciphers.is_empty()
                || !self.macs.is_empty()
            {
                return Err(JessError::config("missing a key derivation tool"));
            }
            return Ok(letter.data.clone());
        }

        // Key establishment.
        if self.wire.is_some() {
            let mut wire = self.wire.take().expect("wire presence checked above");
            let result = self.wire_recv_handshake_and_init_kdf(&mut wire, letter);
            self.wire = Some(wire);
            result?;
        } else {
            let material = self.setup_opening_key_material(letter, None)?;
            self.init_kdf(&letter.nonce, &material)?;
        }

        self.setup_tools()?;
        let result = self.check_and_decrypt(letter);
        let reset_result = self.reset_tools();
        let data = result?;
        reset_result?;
        Ok(data)
    }

    /// Verifies the signatures of the given letter without decrypting it.
    pub fn verify(&mut self, letter: &Letter) -> Result<(), JessError> {
        if self.wire.is_none() && letter.version != 1 {
            return Err(JessError::UnsupportedVersion(letter.version));
        }

        if self.signers.is_empty() {
            return Err(JessError::AuthenticityViolation("no signatures to verify".into()));
        }

        let associated_data = if !self.integrated_ciphers.is_empty() || !self.macs.is_empty() {
            letter.compile_associated_data()
        } else {
            Vec::new()
        };

        let result = self.verify_signatures(letter, associated_data);
        self.reset_managed_hashers();
        result
    }

    /// Checks every signature against the senders of the reconstructed
    /// envelope, advancing a shared signature index across signer tools.
    fn verify_signatures(
        &mut self,
        letter: &Letter,
        associated_data: Vec<u8>,
    ) -> Result<(), JessError> {
        let Session { envelope, signers, managed_signing_hashers, .. } = self;

        let signing_data = letter.compile_associated_signing_data(associated_data);
        feed_managed(managed_signing_hashers, &letter.data, &signing_data);

        if envelope.senders.len() != letter.signatures.len() {
            return Err(JessError::AuthenticityViolation(
                "mismatch regarding available signatures and senders".into(),
            ));
        }

        let mut sig_index = 0usize;
        for slot in signers.iter() {
            for sender in envelope.senders.iter().filter(|s| s.scheme == slot.info.name) {
                let seal = letter.signatures.get(sig_index).ok_or_else(|| {
                    JessError::AuthenticityViolation("missing signature".into())
                })?;
                let sum = managed_sum(managed_signing_hashers, slot.managed_hash.as_ref());
                slot.logic
                    .verify(&letter.data, &signing_data, sum.as_deref(), &seal.value, sender)
                    .map_err(|err| {
                        JessError::AuthenticityViolation(format!(
                            "failed to verify signature ({}) with ID {}: {err}",
                            slot.info.name, seal.id
                        ))
                    })?;
                sig_index += 1;
            }
        }
        Ok(())
    }

    /// Reconstructs key material from the letter's seals, preserving the
    /// order established during closing.
    pub(crate) fn setup_opening_key_material(
        &mut self,
        letter: &Letter,
        mut wire: Option<&mut WireSession>,
    ) -> Result<Vec<Vec<u8>>, JessError> {
        let Session {
            envelope,
            pass_deriver,
            key_exchangers,
            key_encapsulators,
            default_symmetric_key_size,
            ..
        } = self;

        let mut material: Vec<Vec<u8>> = Vec::new();
        let mut seal_index = 0usize;

        // The initial wire handshake is special: key encapsulators send an
        // extra ephemeral key seal, so the count check only applies to
        // letters at rest.
        if wire.is_none()
            && envelope.secrets.len() + envelope.senders.len() + envelope.recipients.len()
                < letter.keys.len()
        {
            return Err(JessError::format("missing keys in letter"));
        }

        // Raw keys: the material comes from the local signet, the seal is
        // skipped.
        for signet in envelope.secrets.iter().filter(|s| s.scheme == SIGNET_SCHEME_KEY) {
            material.push(signet.key.clone());
            seal_index += 1;
        }

        // Passwords: re-derived from the local signet with the letter
        // nonce.
        if let Some(deriver) = pass_deriver.as_mut() {
            for signet in envelope.secrets.iter().filter(|s| s.scheme == SIGNET_SCHEME_PASSWORD) {
                if signet.key.is_empty() {
                    return Err(JessError::PasswordUnavailable { id: signet.id.clone() });
                }
                material.push(deriver.logic.derive_key_from_password(
                    &signet.key,
                    &letter.nonce,
                    *default_symmetric_key_size,
                )?);
                seal_index += 1;
            }
        }

        // Key exchange: the seal carries the sender's ephemeral public key,
        // the local private half comes from the envelope.
        for slot in key_exchangers.iter() {
            for signet in envelope.recipients.iter().filter(|s| s.scheme == slot.info.name) {
                let seal = letter
                    .keys
                    .get(seal_index)
                    .ok_or_else(|| JessError::format("missing key seal in letter"))?;
                seal_index += 1;

                let mut peer = Signet {
                    version: letter.version,
                    scheme: slot.info.name.to_string(),
                    key: seal.value.clone(),
                    public: true,
                    ..Signet::default()
                };
                // The seal value is attacker controlled; a key that fails
                // to parse is treated like any other corruption.
                peer.load_key().map_err(|_| {
                    JessError::IntegrityViolation(
                        "failed to load ephemeral signet for key exchange".into(),
                    )
                })?;

                if let Some(wire) = wire.as_deref_mut() {
                    wire.e_kx.push(KxPair {
                        scheme: slot.info.name,
                        signet: None,
                        peer: Some(peer.clone()),
                    });
                }

                material.push(slot.logic.make_shared_key(signet, &peer)?);
            }
        }

        // Key encapsulation: unwrap with the local private half.
        for slot in key_encapsulators.iter() {
            for signet in envelope.recipients.iter().filter(|s| s.scheme == slot.info.name) {
                if let Some(wire) = wire.as_deref_mut() {
                    wire.e_ke.push(KePair { scheme: slot.info.name, signet: None, seal: None });
                }

                let seal = letter
                    .keys
                    .get(seal_index)
                    .ok_or_else(|| JessError::format("missing key seal in letter"))?;
                let unwrapped = slot.logic.unwrap_key(&seal.value, signet).map_err(|err| {
                    JessError::IntegrityViolation(format!("[{}] {err}", slot.info.name))
                })?;
                material.push(unwrapped);
                seal_index += 1;
            }
        }

        Ok(material)
    }

    /// Checks the MAC, then reverses the integrated cipher and cipher
    /// stacks.
    fn check_and_decrypt(&mut self, letter: &Letter) -> Result<Vec<u8>, JessError> {
        let Session { integrated_ciphers, ciphers, macs, managed_mac_hashers, .. } = self;

        let mut data = letter.data.clone();
        let associated_data = if !integrated_ciphers.is_empty() || !macs.is_empty() {
            letter.compile_associated_data()
        } else {
            Vec::new()
        };

        // MAC check, constant time.
        if !macs.is_empty() {
            feed_managed(managed_mac_hashers, &data, &associated_data);

            let mut all_macs = Container::new();
            for slot in macs.iter_mut() {
                let sum = managed_sum(managed_mac_hashers, slot.managed_hash.as_ref());
                let mac = slot.logic.mac(&data, &associated_data, sum.as_deref())?;
                all_macs.append_block(&mac);
            }

            if letter.mac.ct_eq(all_macs.as_slice()).unwrap_u8() != 1 {
                return Err(JessError::IntegrityViolation("MAC verification failed".into()));
            }
        }

        // Integrated ciphers, in reversed order.
        for slot in integrated_ciphers.iter_mut().rev() {
            data = slot.logic.authenticated_decrypt(data, &associated_data).map_err(|err| {
                JessError::IntegrityViolation(format!("[{}] {err}", slot.info.name))
            })?;
        }

        // Ciphers, in reversed order.
        for slot in ciphers.iter_mut().rev() {
            data = slot.logic.decrypt(data).map_err(|err| {
                JessError::IntegrityViolation(format!(
                    "decryption failed: [{}] {err}",
                    slot.info.name
                ))
            })?;
        }

        Ok(data)
    }
}
