//! The global tool registry.
//!
//! Built once on first access and read-only afterwards; suites reference
//! tools by name.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::tool::Tool;
use crate::ToolError;

static TOOLS: Lazy<BTreeMap<&'static str, Tool>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for tool in builtin() {
        let existing = map.insert(tool.info.name, tool);
        debug_assert!(existing.is_none(), "duplicate tool registration");
    }
    map
});

fn builtin() -> Vec<Tool> {
    let mut tools = vec![
        crate::kdf::hkdf_tool(),
        crate::kdf::blake3_kdf_tool(),
        crate::passderiv::scrypt_tool(),
        crate::passderiv::pbkdf2_tool(),
        crate::aead::chacha20_poly1305_tool(),
        crate::mac::hmac_tool(),
        crate::signing::ed25519_tool(),
        crate::exchange::x25519_tool(),
        crate::encapsulation::rsa_oaep_tool(),
    ];
    tools.extend(crate::aead::aes_gcm_tools());
    tools.extend(crate::cipher::aes_ctr_tools());
    tools
}

/// Returns the tool with the given name.
pub fn get(name: &str) -> Result<&'static Tool, ToolError> {
    TOOLS.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))
}

/// Returns all registered tools, ordered by name.
pub fn tools() -> impl Iterator<Item = &'static Tool> {
    TOOLS.values()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Purpose, ToolOption};

    #[test]
    fn registry_contains_all_builtins() {
        let names: Vec<_> = tools().map(|t| t.info.name).collect();
        for expected in [
            "HKDF",
            "BLAKE3-KDF",
            "SCRYPT-20",
            "PBKDF2-SHA2-256",
            "CHACHA20-POLY1305",
            "AES128-GCM",
            "AES192-GCM",
            "AES256-GCM",
            "AES128-CTR",
            "AES192-CTR",
            "AES256-CTR",
            "HMAC",
            "Ed25519",
            "ECDH-X25519",
            "RSA-OAEP",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn unknown_tool_fails() {
        assert!(matches!(get("ENIGMA"), Err(ToolError::NotFound(_))));
    }

    #[test]
    fn key_owning_tools_expose_a_key_handler() {
        for tool in tools() {
            let owns_keys = matches!(
                tool.info.purpose,
                Purpose::KeyExchange | Purpose::KeyEncapsulation | Purpose::Signing
            );
            assert_eq!(
                tool.key_handler.is_some(),
                owns_keys,
                "key handler mismatch for {}",
                tool.info.name
            );
        }
    }

    #[test]
    fn dedicated_hasher_tools_reject_missing_hash() {
        for tool in tools() {
            if tool.info.has_option(ToolOption::NeedsDedicatedHasher) {
                assert!(
                    tool.new_instance(None).is_err(),
                    "{} must require a hash tool",
                    tool.info.name
                );
            }
        }
    }
}
