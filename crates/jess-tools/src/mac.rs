//! Message authentication: HMAC over the dedicated hash tool.

use hmac::digest::crypto_common::BlockSizeUser;
use hmac::{Mac as _, SimpleHmac};
use sha2::{Digest, Sha256, Sha512};

use crate::hashes::HashTool;
use crate::logic::{burn_bytes, Helper, Mac, ToolInstance};
use crate::tool::{Purpose, Tool, ToolInfo, ToolOption};
use crate::ToolError;

type Blake2b256 = blake2::Blake2b<blake2::digest::consts::U32>;

pub(crate) fn hmac_tool() -> Tool {
    Tool {
        info: ToolInfo {
            name: "HMAC",
            purpose: Purpose::Mac,
            options: &[ToolOption::NeedsDedicatedHasher, ToolOption::HasState],
            key_size: 0,
            nonce_size: 0,
            security_level: 0, // depends on used hash function
            comment: "RFC 2104, FIPS 198",
            author: "Mihir Bellare et al., 1996",
        },
        key_handler: None,
        factory: |hash| {
            let hash = hash.ok_or(ToolError::HasherRequired { tool: "HMAC" })?;
            Ok(ToolInstance::Mac(Box::new(Hmac { hash, key: Vec::new() })))
        },
    }
}

struct Hmac {
    hash: &'static HashTool,
    key: Vec<u8>,
}

impl Hmac {
    fn compute<H>(&self, data: &[u8], associated_data: &[u8]) -> Vec<u8>
    where
        H: Digest + BlockSizeUser + Clone,
    {
        let mut mac =
            SimpleHmac::<H>::new_from_slice(&self.key).expect("HMAC accepts any key size");
        mac.update(data);
        if !associated_data.is_empty() {
            mac.update(associated_data);
        }
        mac.finalize().into_bytes().to_vec()
    }
}

impl Mac for Hmac {
    fn setup(&mut self, helper: &mut Helper<'_>) -> Result<(), ToolError> {
        self.key = helper.new_session_key()?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), ToolError> {
        burn_bytes(&mut self.key);
        self.key.clear();
        Ok(())
    }

    fn mac(
        &mut self,
        data: &[u8],
        associated_data: &[u8],
        _managed_sum: Option<&[u8]>,
    ) -> Result<Vec<u8>, ToolError> {
        if self.key.is_empty() {
            return Err(ToolError::op("HMAC", "mac key is not set up"));
        }
        let sum = match self.hash.name {
            "SHA2-256" => self.compute::<Sha256>(data, associated_data),
            "SHA2-512" => self.compute::<Sha512>(data, associated_data),
            "BLAKE2b-256" => self.compute::<Blake2b256>(data, associated_data),
            "BLAKE3" => self.compute::<blake3::Hasher>(data, associated_data),
            other => return Err(ToolError::HashToolNotFound(other.to_string())),
        };
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::get_hash_tool;

    fn keyed_hmac(hash: &str) -> Hmac {
        Hmac { hash: get_hash_tool(hash).unwrap(), key: vec![0x0b; 20] }
    }

    #[test]
    fn mac_is_deterministic() {
        let mut mac = keyed_hmac("SHA2-256");
        let a = mac.mac(b"data", b"aad", None).unwrap();
        let b = mac.mac(b"data", b"aad", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn mac_covers_associated_data() {
        let mut mac = keyed_hmac("SHA2-256");
        let a = mac.mac(b"data", b"aad-1", None).unwrap();
        let b = mac.mac(b"data", b"aad-2", None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn mac_without_key_fails() {
        let mut mac = Hmac { hash: get_hash_tool("SHA2-256").unwrap(), key: Vec::new() };
        assert!(mac.mac(b"data", b"", None).is_err());
    }

    #[test]
    fn reset_burns_key() {
        let mut mac = keyed_hmac("SHA2-256");
        mac.reset().unwrap();
        assert!(mac.key.is_empty());
    }
}
