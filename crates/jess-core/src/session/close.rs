//! Closing: encrypting and signing data into a letter.
//!
//! Key material is assembled in a fixed order that the opening side can
//! reproduce from the letter's seals alone: static keys, derived passwords,
//! key exchanges, key encapsulations. The suite token order governs every
//! stage after that.

use jess_tools::random;

use crate::container::Container;
use crate::letter::{Letter, Seal};
use crate::signet::{Signet, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD};
use crate::JessError;

use super::{feed_managed, managed_sum, Session, WireSession};
use super::wire::{KePair, KxPair};

impl Session {
    /// Encrypts (and possibly signs) the given data and returns a letter.
    ///
    /// An envelope takes the message, is closed, and the result is a
    /// letter.
    pub fn close(&mut self, data: &[u8]) -> Result<Letter, JessError> {
        let result = self.close_inner(data);
        self.reset_managed_hashers();
        result
    }

    fn close_inner(&mut self, data: &[u8]) -> Result<Letter, JessError> {
        let mut letter = Letter::default();

        // Only the first message of a wire correspondence carries version
        // and suite id; letters at rest always do.
        if self.wire.as_ref().map_or(true, |wire| wire.msg_no == 0) {
            letter.version = self.envelope.version;
            letter.suite_id = self.envelope.suite_id.clone();
        }

        letter.nonce = random::random_bytes(self.nonce_size())?;

        let mut data = data.to_vec();

        if self.kdf.is_some() {
            // Key establishment.
            if self.wire.is_some() {
                let mut wire = self.wire.take().expect("wire presence checked above");
                let result = self.wire_send_handshake_and_init_kdf(&mut wire, &mut letter);
                self.wire = Some(wire);
                result?;
            } else {
                let material = self.setup_closing_key_material(&mut letter, None)?;
                self.init_kdf(&letter.nonce, &material)?;
            }

            self.setup_tools()?;
            let transformed = self.encrypt_and_mac(&mut letter, data);
            let reset_result = self.reset_tools();
            data = transformed?;
            reset_result?;
        } else if !self.ciphers.is_empty()
            || !self.integrated_ciphers.is_empty()
            || !self.macs.is_empty()
        {
            // Nothing should reach here without a KDF; compile rejects it.
            return Err(JessError::config("missing a key derivation tool"));
        }

        // Data processing is complete.
        letter.data = data;

        if !self.signers.is_empty() {
            self.sign_letter(&mut letter)?;
        }

        Ok(letter)
    }

    /// Initializes the KDF with the letter nonce and assembled material.
    pub(crate) fn init_kdf(
        &mut self,
        nonce: &[u8],
        material: &[Vec<u8>],
    ) -> Result<(), JessError> {
        let refs: Vec<&[u8]> = material.iter().map(Vec::as_slice).collect();
        let kdf = self.kdf.as_mut().expect("callers check for a kdf");
        Ok(kdf.logic.init_key_derivation(nonce, &refs)?)
    }

    /// Gathers key material for closing, appending one seal per material
    /// part to the letter.
    pub(crate) fn setup_closing_key_material(
        &mut self,
        letter: &mut Letter,
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

        // Raw keys.
        for signet in envelope.secrets.iter().filter(|s| s.scheme == SIGNET_SCHEME_KEY) {
            letter.keys.push(Seal {
                scheme: SIGNET_SCHEME_KEY.to_string(),
                id: signet.id.clone(),
                value: Vec::new(),
            });
            material.push(signet.key.clone());
        }

        // Passwords, derived with the letter nonce as salt.
        if let Some(deriver) = pass_deriver.as_mut() {
            for signet in envelope.secrets.iter().filter(|s| s.scheme == SIGNET_SCHEME_PASSWORD) {
                if signet.key.is_empty() {
                    return Err(JessError::PasswordUnavailable { id: signet.id.clone() });
                }
                let key = deriver.logic.derive_key_from_password(
                    &signet.key,
                    &letter.nonce,
                    *default_symmetric_key_size,
                )?;
                letter.keys.push(Seal {
                    scheme: SIGNET_SCHEME_PASSWORD.to_string(),
                    id: signet.id.clone(),
                    value: Vec::new(),
                });
                material.push(key);
            }
        }

        // Key exchange: a fresh ephemeral signet per recipient, its public
        // half travels in the seal.
        for slot in key_exchangers.iter() {
            for recipient in envelope.recipients.iter().filter(|s| s.scheme == slot.info.name) {
                let mut ephemeral = Signet::new_base(slot.info.name);
                ephemeral.generate_key()?;

                let shared = slot.logic.make_shared_key(&ephemeral, recipient)?;

                let mut public = ephemeral.as_recipient()?;
                public.store_key()?;
                letter.keys.push(Seal {
                    scheme: String::new(),
                    id: recipient.id.clone(),
                    value: public.key,
                });

                // Wire sessions keep the ephemeral half for the rekey
                // handshake; everything else burns it right away.
                match wire.as_deref_mut() {
                    Some(wire) => wire.e_kx.push(KxPair {
                        scheme: slot.info.name,
                        signet: Some(ephemeral),
                        peer: None,
                    }),
                    None => {
                        let _ = ephemeral.burn();
                    }
                }

                material.push(shared);
            }
        }

        // Key encapsulation: a fresh random key per recipient, wrapped
        // under the recipient's public key.
        for slot in key_encapsulators.iter() {
            for recipient in envelope.recipients.iter().filter(|s| s.scheme == slot.info.name) {
                if let Some(wire) = wire.as_deref_mut() {
                    wire.e_ke.push(KePair { scheme: slot.info.name, signet: None, seal: None });
                }

                let new_key = random::random_bytes(*default_symmetric_key_size)?;
                let wrapped = slot.logic.encapsulate_key(&new_key, recipient)?;
                letter.keys.push(Seal {
                    scheme: String::new(),
                    id: recipient.id.clone(),
                    value: wrapped,
                });
                material.push(new_key);
            }
        }

        Ok(material)
    }

    /// Applies the cipher stack, integrated ciphers, and MACs to the data.
    fn encrypt_and_mac(
        &mut self,
        letter: &mut Letter,
        mut data: Vec<u8>,
    ) -> Result<Vec<u8>, JessError> {
        let Session { ciphers, integrated_ciphers, macs, managed_mac_hashers, .. } = self;

        // Ciphers, in suite order.
        for slot in ciphers.iter_mut() {
            data = slot.logic.encrypt(data)?;
        }

        let associated_data = if !integrated_ciphers.is_empty() || !macs.is_empty() {
            letter.compile_associated_data()
        } else {
            Vec::new()
        };

        // Integrated ciphers, in suite order.
        for slot in integrated_ciphers.iter_mut() {
            data = slot.logic.authenticated_encrypt(data, &associated_data)?;
        }

        if !macs.is_empty() {
            feed_managed(managed_mac_hashers, &data, &associated_data);

            let mut all_macs = Container::new();
            for slot in macs.iter_mut() {
                let sum = managed_sum(managed_mac_hashers, slot.managed_hash.as_ref());
                let mac = slot.logic.mac(&data, &associated_data, sum.as_deref())?;
                all_macs.append_block(&mac);
            }
            letter.mac = all_macs.into_inner();
        }

        Ok(data)
    }

    /// Appends one signature per sender, in suite order.
    fn sign_letter(&mut self, letter: &mut Letter) -> Result<(), JessError> {
        let Session { envelope, signers, managed_signing_hashers, .. } = self;

        let signing_data = letter.compile_associated_signing_data(Vec::new());
        feed_managed(managed_signing_hashers, &letter.data, &signing_data);

        let mut signatures = Vec::new();
        for slot in signers.iter() {
            for sender in envelope.senders.iter().filter(|s| s.scheme == slot.info.name) {
                let sum = managed_sum(managed_signing_hashers, slot.managed_hash.as_ref());
                let signature =
                    slot.logic.sign(&letter.data, &signing_data, sum.as_deref(), sender)?;
                signatures.push(Seal {
                    scheme: slot.info.name.to_string(),
                    id: sender.id.clone(),
                    value: signature,
                });
            }
        }
        letter.signatures = signatures;
        Ok(())
    }
}
