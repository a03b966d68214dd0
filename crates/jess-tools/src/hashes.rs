//! Hash tool registry.
//!
//! Hash tools back the `(hashName)` suite arguments: `HKDF(BLAKE2b-256)`
//! instantiates the HKDF tool over BLAKE2b-256. Digest instances are type
//! erased so managed hasher pools can share them across tools.

use std::collections::BTreeMap;

use digest::DynDigest;
use once_cell::sync::Lazy;

use crate::ToolError;

type Blake2b256 = blake2::Blake2b<blake2::digest::consts::U32>;

/// A type-erased digest instance, as produced by [`HashTool::new_digest`].
pub type DynHasher = Box<dyn DynDigest + Send>;

/// A registered hash function.
pub struct HashTool {
    /// Unique hash tool name, referenced by suite arguments.
    pub name: &'static str,
    /// Digest size in bytes.
    pub digest_size: usize,
    /// Internal block size in bytes.
    pub block_size: usize,
    /// Approximate attack complexity as `2^n`.
    pub security_level: i32,
    /// Standards reference.
    pub comment: &'static str,
    /// Algorithm author and year.
    pub author: &'static str,
    new_fn: fn() -> DynHasher,
}

impl HashTool {
    /// Returns a fresh digest instance.
    pub fn new_digest(&self) -> DynHasher {
        (self.new_fn)()
    }
}

impl std::fmt::Debug for HashTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTool").field("name", &self.name).finish_non_exhaustive()
    }
}

static HASH_TOOLS: Lazy<BTreeMap<&'static str, HashTool>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for tool in builtin() {
        map.insert(tool.name, tool);
    }
    map
});

fn builtin() -> Vec<HashTool> {
    vec![
        HashTool {
            name: "SHA2-256",
            digest_size: 32,
            block_size: 64,
            security_level: 128,
            comment: "FIPS 180-4",
            author: "NSA, 2001",
            new_fn: || Box::new(<sha2::Sha256 as digest::Digest>::new()),
        },
        HashTool {
            name: "SHA2-512",
            digest_size: 64,
            block_size: 128,
            security_level: 256,
            comment: "FIPS 180-4",
            author: "NSA, 2001",
            new_fn: || Box::new(<sha2::Sha512 as digest::Digest>::new()),
        },
        HashTool {
            name: "BLAKE2b-256",
            digest_size: 32,
            block_size: 128,
            security_level: 128,
            comment: "RFC 7693",
            author: "Jean-Philippe Aumasson et al., 2013",
            new_fn: || Box::new(<Blake2b256 as digest::Digest>::new()),
        },
        HashTool {
            name: "BLAKE3",
            digest_size: 32,
            block_size: 64,
            security_level: 128,
            comment: "cryptographic hash function based on Bao and BLAKE2",
            author: "Jean-Philippe Aumasson et al., 2020",
            new_fn: || Box::new(blake3::Hasher::new()),
        },
    ]
}

/// Returns the hash tool with the given name.
pub fn get_hash_tool(name: &str) -> Result<&'static HashTool, ToolError> {
    HASH_TOOLS.get(name).ok_or_else(|| ToolError::HashToolNotFound(name.to_string()))
}

/// Returns all registered hash tools, ordered by name.
pub fn hash_tools() -> impl Iterator<Item = &'static HashTool> {
    HASH_TOOLS.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_builtins() {
        for name in ["SHA2-256", "SHA2-512", "BLAKE2b-256", "BLAKE3"] {
            let tool = get_hash_tool(name).unwrap();
            assert_eq!(tool.name, name);
        }
    }

    #[test]
    fn unknown_hash_fails() {
        assert!(matches!(get_hash_tool("MD5"), Err(ToolError::HashToolNotFound(_))));
    }

    #[test]
    fn digest_size_matches_output() {
        for tool in hash_tools() {
            let mut digest = tool.new_digest();
            digest.update(b"jess");
            let sum = digest.finalize_reset();
            assert_eq!(sum.len(), tool.digest_size, "digest size mismatch for {}", tool.name);
        }
    }
}
