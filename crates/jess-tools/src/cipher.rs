//! Plain ciphers: AES-CTR.
//!
//! CTR mode provides no integrity on its own; the session compiler rejects
//! suites that promise confidentiality without an integrity tool.

use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::logic::{burn_bytes, Cipher, Helper, ToolInstance};
use crate::tool::{Purpose, Tool, ToolInfo, ToolOption};
use crate::ToolError;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

pub(crate) fn aes_ctr_tools() -> Vec<Tool> {
    vec![
        Tool {
            info: aes_ctr_info("AES128-CTR", 16, 128),
            key_handler: None,
            factory: |_| {
                Ok(ToolInstance::Cipher(Box::new(AesCtr::new("AES128-CTR", CtrKind::Aes128))))
            },
        },
        Tool {
            info: aes_ctr_info("AES192-CTR", 24, 192),
            key_handler: None,
            factory: |_| {
                Ok(ToolInstance::Cipher(Box::new(AesCtr::new("AES192-CTR", CtrKind::Aes192))))
            },
        },
        Tool {
            info: aes_ctr_info("AES256-CTR", 32, 256),
            key_handler: None,
            factory: |_| {
                Ok(ToolInstance::Cipher(Box::new(AesCtr::new("AES256-CTR", CtrKind::Aes256))))
            },
        },
    ]
}

fn aes_ctr_info(name: &'static str, key_size: usize, security_level: i32) -> ToolInfo {
    ToolInfo {
        name,
        purpose: Purpose::Cipher,
        options: &[ToolOption::HasState],
        key_size,
        nonce_size: 16, // AES block size, used as the counter IV
        security_level,
        comment: "aka Rijndael, FIPS 197",
        author: "Vincent Rijmen and Joan Daemen, 1998",
    }
}

#[derive(Clone, Copy)]
enum CtrKind {
    Aes128,
    Aes192,
    Aes256,
}

enum CtrStream {
    Aes128(Aes128Ctr),
    Aes192(Aes192Ctr),
    Aes256(Aes256Ctr),
}

impl CtrStream {
    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(stream) => stream.apply_keystream(data),
            Self::Aes192(stream) => stream.apply_keystream(data),
            Self::Aes256(stream) => stream.apply_keystream(data),
        }
    }
}

struct AesCtr {
    name: &'static str,
    kind: CtrKind,
    stream: Option<CtrStream>,
}

impl AesCtr {
    fn new(name: &'static str, kind: CtrKind) -> Self {
        Self { name, kind, stream: None }
    }

    fn apply(&mut self, mut data: Vec<u8>) -> Result<Vec<u8>, ToolError> {
        match self.stream.as_mut() {
            Some(stream) => {
                stream.apply(&mut data);
                Ok(data)
            }
            None => Err(ToolError::op(self.name, "cipher is not set up")),
        }
    }
}

impl Cipher for AesCtr {
    fn setup(&mut self, helper: &mut Helper<'_>) -> Result<(), ToolError> {
        let mut key = helper.new_session_key()?;
        let mut iv = helper.new_session_nonce()?;

        let stream = match self.kind {
            CtrKind::Aes128 => CtrStream::Aes128(
                Aes128Ctr::new_from_slices(&key, &iv).map_err(|_| ToolError::InvalidKey)?,
            ),
            CtrKind::Aes192 => CtrStream::Aes192(
                Aes192Ctr::new_from_slices(&key, &iv).map_err(|_| ToolError::InvalidKey)?,
            ),
            CtrKind::Aes256 => CtrStream::Aes256(
                Aes256Ctr::new_from_slices(&key, &iv).map_err(|_| ToolError::InvalidKey)?,
            ),
        };
        self.stream = Some(stream);
        burn_bytes(&mut key);
        burn_bytes(&mut iv);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ToolError> {
        self.stream = None;
        Ok(())
    }

    fn encrypt(&mut self, data: Vec<u8>) -> Result<Vec<u8>, ToolError> {
        self.apply(data)
    }

    fn decrypt(&mut self, data: Vec<u8>) -> Result<Vec<u8>, ToolError> {
        self.apply(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::KeyDeriver;

    struct FixedKdf;

    impl KeyDeriver for FixedKdf {
        fn init_key_derivation(&mut self, _: &[u8], _: &[&[u8]]) -> Result<(), ToolError> {
            Ok(())
        }

        fn derive_key_into(&mut self, out: &mut [u8]) -> Result<(), ToolError> {
            out.fill(0x17);
            Ok(())
        }
    }

    fn fresh(kind: CtrKind, name: &'static str, key_size: usize) -> AesCtr {
        let mut tool = AesCtr::new(name, kind);
        let info = aes_ctr_info(name, key_size, 128);
        let mut kdf = FixedKdf;
        let mut helper = Helper::new(Some(&mut kdf), &info, 16, 128, 128);
        tool.setup(&mut helper).unwrap();
        tool
    }

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        for (kind, name, key_size) in [
            (CtrKind::Aes128, "AES128-CTR", 16),
            (CtrKind::Aes192, "AES192-CTR", 24),
            (CtrKind::Aes256, "AES256-CTR", 32),
        ] {
            let ciphertext = fresh(kind, name, key_size).encrypt(b"stream data".to_vec()).unwrap();
            assert_ne!(ciphertext, b"stream data");

            // A fresh stream with the same key and IV decrypts.
            let plaintext = fresh(kind, name, key_size).decrypt(ciphertext).unwrap();
            assert_eq!(plaintext, b"stream data");
        }
    }

    #[test]
    fn unset_cipher_rejects_data() {
        let mut tool = AesCtr::new("AES256-CTR", CtrKind::Aes256);
        assert!(tool.encrypt(b"data".to_vec()).is_err());
    }
}
