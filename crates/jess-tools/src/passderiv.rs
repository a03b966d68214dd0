//! Password derivation tools: scrypt and PBKDF2.
//!
//! Iteration parameters are fixed per tool and security critical; the
//! password strength estimator in `jess-core` folds them into its entropy
//! calculation by tool name.

use pbkdf2::pbkdf2_hmac;
use scrypt::Params;
use sha2::Sha256;

use crate::logic::{PassDeriver, ToolInstance};
use crate::tool::{Purpose, Tool, ToolInfo, ToolOption};
use crate::ToolError;

pub(crate) fn scrypt_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "SCRYPT-20",
            purpose: Purpose::PassDerivation,
            options: &[ToolOption::NeedsDefaultKeySize],
            key_size: 0,
            nonce_size: 0,
            security_level: 0, // security of default key size
            comment: "RFC 7914",
            author: "Colin Percival, 2009",
        },
        key_handler: None,
        factory: |_| {
            Ok(ToolInstance::PassDeriver(Box::new(Scrypt {
                log_n: 20, // 2^20 resp. 1,048,576 - CPU/memory cost parameter
                r: 8,
                p: 1,
            })))
        },
    }
}

pub(crate) fn pbkdf2_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "PBKDF2-SHA2-256",
            purpose: Purpose::PassDerivation,
            options: &[ToolOption::NeedsDefaultKeySize],
            key_size: 0,
            nonce_size: 0,
            security_level: 0, // security level of SHA2-256
            comment: "PKCS #5 v2.1, RFC 8018",
            author: "Burt Kaliski, RSA Laboratories, 2000/2017",
        },
        key_handler: None,
        factory: |_| Ok(ToolInstance::PassDeriver(Box::new(Pbkdf2 { iterations: 20_000 }))),
    }
}

struct Scrypt {
    log_n: u8,
    r: u32,
    p: u32,
}

impl PassDeriver for Scrypt {
    fn derive_key_from_password(
        &mut self,
        password: &[u8],
        salt: &[u8],
        key_size: usize,
    ) -> Result<Vec<u8>, ToolError> {
        let params = Params::new(self.log_n, self.r, self.p, key_size)
            .map_err(|err| ToolError::op("SCRYPT-20", err.to_string()))?;
        let mut key = vec![0u8; key_size];
        scrypt::scrypt(password, salt, &params, &mut key)
            .map_err(|err| ToolError::op("SCRYPT-20", err.to_string()))?;
        Ok(key)
    }
}

struct Pbkdf2 {
    iterations: u32,
}

impl PassDeriver for Pbkdf2 {
    fn derive_key_from_password(
        &mut self,
        password: &[u8],
        salt: &[u8],
        key_size: usize,
    ) -> Result<Vec<u8>, ToolError> {
        let mut key = vec![0u8; key_size];
        pbkdf2_hmac::<Sha256>(password, salt, self.iterations, &mut key);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbkdf2_is_deterministic() {
        let mut deriver = Pbkdf2 { iterations: 100 };
        let a = deriver.derive_key_from_password(b"password", b"salt", 16).unwrap();
        let b = deriver.derive_key_from_password(b"password", b"salt", 16).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn pbkdf2_salt_changes_key() {
        let mut deriver = Pbkdf2 { iterations: 100 };
        let a = deriver.derive_key_from_password(b"password", b"salt-a", 16).unwrap();
        let b = deriver.derive_key_from_password(b"password", b"salt-b", 16).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn scrypt_derives_with_small_params() {
        // Small cost parameters; the registered tool uses log_n = 20.
        let mut deriver = Scrypt { log_n: 4, r: 8, p: 1 };
        let a = deriver.derive_key_from_password(b"password", b"salt", 32).unwrap();
        let b = deriver.derive_key_from_password(b"password", b"salt", 32).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }
}
