//! Integrated ciphers: ChaCha20-Poly1305 and AES-GCM.
//!
//! Instances pull their key and nonce from the session KDF during `setup`
//! and burn them in `reset`. The nonce is derived, not random: it is fresh
//! because the KDF is re-initialized with a fresh letter nonce per message.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;

use crate::logic::{burn_bytes, Helper, IntegratedCipher, ToolInstance};
use crate::tool::{Purpose, Tool, ToolInfo, ToolOption};
use crate::ToolError;

type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, U12>;

pub(crate) fn chacha20_poly1305_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "CHACHA20-POLY1305",
            purpose: Purpose::IntegratedCipher,
            options: &[ToolOption::HasState],
            key_size: 32,
            nonce_size: 12,
            // ChaCha20 is actually 256. Limited to 128 because of Poly1305.
            security_level: 128,
            comment: "RFC 7539",
            author: "Daniel J. Bernstein, 2008 and 2005",
        },
        key_handler: None,
        factory: |_| {
            Ok(ToolInstance::IntegratedCipher(Box::new(AeadTool::new(
                "CHACHA20-POLY1305",
                AeadKind::ChaCha20Poly1305,
            ))))
        },
    }
}

pub(crate) fn aes_gcm_tools() -> Vec<Tool> {
    vec![
        Tool {
            info: aes_gcm_info("AES128-GCM", 16, 128),
            key_handler: None,
            factory: |_| {
                Ok(ToolInstance::IntegratedCipher(Box::new(AeadTool::new(
                    "AES128-GCM",
                    AeadKind::Aes128Gcm,
                ))))
            },
        },
        Tool {
            info: aes_gcm_info("AES192-GCM", 24, 192),
            key_handler: None,
            factory: |_| {
                Ok(ToolInstance::IntegratedCipher(Box::new(AeadTool::new(
                    "AES192-GCM",
                    AeadKind::Aes192Gcm,
                ))))
            },
        },
        Tool {
            info: aes_gcm_info("AES256-GCM", 32, 256),
            key_handler: None,
            factory: |_| {
                Ok(ToolInstance::IntegratedCipher(Box::new(AeadTool::new(
                    "AES256-GCM",
                    AeadKind::Aes256Gcm,
                ))))
            },
        },
    ]
}

fn aes_gcm_info(name: &'static str, key_size: usize, security_level: i32) -> ToolInfo {
    ToolInfo {
        name,
        purpose: Purpose::IntegratedCipher,
        options: &[ToolOption::HasState],
        key_size,
        nonce_size: 12,
        security_level,
        comment: "aka Rijndael, FIPS 197",
        author: "Vincent Rijmen and Joan Daemen, 1998",
    }
}

#[derive(Clone, Copy, PartialEq)]
enum AeadKind {
    ChaCha20Poly1305,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

enum AeadState {
    ChaCha20Poly1305(ChaCha20Poly1305),
    Aes128Gcm(Aes128Gcm),
    Aes192Gcm(Aes192Gcm),
    Aes256Gcm(Aes256Gcm),
}

struct AeadTool {
    name: &'static str,
    kind: AeadKind,
    state: Option<AeadState>,
    nonce: Vec<u8>,
}

impl AeadTool {
    fn new(name: &'static str, kind: AeadKind) -> Self {
        Self { name, kind, state: None, nonce: Vec::new() }
    }

    fn seal(&self, payload: Payload<'_, '_>) -> Result<Vec<u8>, ToolError> {
        let state = self.state.as_ref().ok_or(ToolError::KdfNotInitialized)?;
        let result = match state {
            AeadState::ChaCha20Poly1305(aead) => aead.encrypt(self.nonce.as_slice().into(), payload),
            AeadState::Aes128Gcm(aead) => aead.encrypt(self.nonce.as_slice().into(), payload),
            AeadState::Aes192Gcm(aead) => aead.encrypt(self.nonce.as_slice().into(), payload),
            AeadState::Aes256Gcm(aead) => aead.encrypt(self.nonce.as_slice().into(), payload),
        };
        result.map_err(|_| ToolError::op(self.name, "encryption failed"))
    }

    fn open(&self, payload: Payload<'_, '_>) -> Result<Vec<u8>, ToolError> {
        let state = self.state.as_ref().ok_or(ToolError::KdfNotInitialized)?;
        let result = match state {
            AeadState::ChaCha20Poly1305(aead) => aead.decrypt(self.nonce.as_slice().into(), payload),
            AeadState::Aes128Gcm(aead) => aead.decrypt(self.nonce.as_slice().into(), payload),
            AeadState::Aes192Gcm(aead) => aead.decrypt(self.nonce.as_slice().into(), payload),
            AeadState::Aes256Gcm(aead) => aead.decrypt(self.nonce.as_slice().into(), payload),
        };
        result.map_err(|_| ToolError::op(self.name, "authentication failed"))
    }
}

impl IntegratedCipher for AeadTool {
    fn setup(&mut self, helper: &mut Helper<'_>) -> Result<(), ToolError> {
        let mut key = helper.new_session_key()?;
        self.nonce = helper.new_session_nonce()?;

        let state = match self.kind {
            AeadKind::ChaCha20Poly1305 => AeadState::ChaCha20Poly1305(
                ChaCha20Poly1305::new_from_slice(&key).map_err(|_| ToolError::InvalidKey)?,
            ),
            AeadKind::Aes128Gcm => AeadState::Aes128Gcm(
                Aes128Gcm::new_from_slice(&key).map_err(|_| ToolError::InvalidKey)?,
            ),
            AeadKind::Aes192Gcm => AeadState::Aes192Gcm(
                Aes192Gcm::new_from_slice(&key).map_err(|_| ToolError::InvalidKey)?,
            ),
            AeadKind::Aes256Gcm => AeadState::Aes256Gcm(
                Aes256Gcm::new_from_slice(&key).map_err(|_| ToolError::InvalidKey)?,
            ),
        };
        self.state = Some(state);
        burn_bytes(&mut key);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ToolError> {
        self.state = None;
        burn_bytes(&mut self.nonce);
        self.nonce.clear();
        Ok(())
    }

    fn authenticated_encrypt(
        &mut self,
        data: Vec<u8>,
        associated_data: &[u8],
    ) -> Result<Vec<u8>, ToolError> {
        self.seal(Payload { msg: &data, aad: associated_data })
    }

    fn authenticated_decrypt(
        &mut self,
        data: Vec<u8>,
        associated_data: &[u8],
    ) -> Result<Vec<u8>, ToolError> {
        self.open(Payload { msg: &data, aad: associated_data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::KeyDeriver;

    struct FixedKdf(u8);

    impl KeyDeriver for FixedKdf {
        fn init_key_derivation(&mut self, _: &[u8], _: &[&[u8]]) -> Result<(), ToolError> {
            Ok(())
        }

        fn derive_key_into(&mut self, out: &mut [u8]) -> Result<(), ToolError> {
            out.fill(self.0);
            Ok(())
        }
    }

    fn setup_tool(kind: AeadKind, name: &'static str, key_byte: u8) -> AeadTool {
        let mut tool = AeadTool::new(name, kind);
        let info = ToolInfo {
            name,
            purpose: Purpose::IntegratedCipher,
            options: &[ToolOption::HasState],
            key_size: match kind {
                AeadKind::Aes128Gcm => 16,
                AeadKind::Aes192Gcm => 24,
                _ => 32,
            },
            nonce_size: 12,
            security_level: 128,
            comment: "",
            author: "",
        };
        let mut kdf = FixedKdf(key_byte);
        let mut helper = Helper::new(Some(&mut kdf), &info, 16, 128, 128);
        tool.setup(&mut helper).unwrap();
        tool
    }

    #[test]
    fn encrypt_decrypt_roundtrip_all_kinds() {
        for (kind, name) in [
            (AeadKind::ChaCha20Poly1305, "CHACHA20-POLY1305"),
            (AeadKind::Aes128Gcm, "AES128-GCM"),
            (AeadKind::Aes192Gcm, "AES192-GCM"),
            (AeadKind::Aes256Gcm, "AES256-GCM"),
        ] {
            let mut tool = setup_tool(kind, name, 0x42);
            let ciphertext =
                tool.authenticated_encrypt(b"hello world".to_vec(), b"aad").unwrap();
            let plaintext = tool.authenticated_decrypt(ciphertext, b"aad").unwrap();
            assert_eq!(plaintext, b"hello world", "roundtrip failed for {name}");
        }
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut tool = setup_tool(AeadKind::ChaCha20Poly1305, "CHACHA20-POLY1305", 0x42);
        let mut ciphertext = tool.authenticated_encrypt(b"hello".to_vec(), b"aad").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(tool.authenticated_decrypt(ciphertext, b"aad").is_err());
    }

    #[test]
    fn wrong_aad_fails() {
        let mut tool = setup_tool(AeadKind::Aes256Gcm, "AES256-GCM", 0x42);
        let ciphertext = tool.authenticated_encrypt(b"hello".to_vec(), b"aad").unwrap();
        assert!(tool.authenticated_decrypt(ciphertext, b"other").is_err());
    }

    #[test]
    fn reset_clears_state() {
        let mut tool = setup_tool(AeadKind::ChaCha20Poly1305, "CHACHA20-POLY1305", 0x42);
        tool.reset().unwrap();
        assert!(tool.authenticated_encrypt(b"hello".to_vec(), b"").is_err());
    }
}
