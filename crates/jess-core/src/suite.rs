//! The suite catalog.
//!
//! A suite is a named, ordered tool recipe plus the security properties it
//! promises. The catalog is built once and read-only afterwards; the
//! `suites` integration test verifies that every claimed `provides` set and
//! security level matches what the session compiler computes.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::requirements::{Requirement, Requirements};

/// Whether a suite should still be used for new letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteStatus {
    /// Should not be used for new letters; kept for opening old ones.
    Deprecated,
    /// Acceptable, but not the first choice.
    Permitted,
    /// The current recommendation.
    Recommended,
}

/// An immutable cipher suite recipe.
#[derive(Debug, Clone)]
pub struct Suite {
    /// Unique suite id, stored in letters.
    pub id: &'static str,
    /// Ordered tool tokens. A token may carry a hash argument, e.g.
    /// `HKDF(BLAKE2b-256)`.
    pub tools: &'static [&'static str],
    /// The security properties the suite claims to deliver.
    pub provides: Requirements,
    /// Declared security level.
    pub security_level: i32,
    /// Usage recommendation.
    pub status: SuiteStatus,
}

/// Suite for encryption with a symmetric key.
pub const SUITE_KEY_V1: &str = "key_v1";
/// Suite for encryption with a password.
pub const SUITE_PASSWORD_V1: &str = "pw_v1";
/// Suite for encrypting for someone without authenticating the sender.
pub const SUITE_RCPT_ONLY_V1: &str = "rcpt_v1";
/// Suite for signing only, no encryption.
pub const SUITE_SIGN_V1: &str = "sign_v1";
/// Suite for signing files, no encryption.
pub const SUITE_SIGN_FILE_V1: &str = "signfile_v1";
/// Suite for encrypting for someone and signing.
pub const SUITE_COMPLETE_V1: &str = "v1";
/// Suite for network communication, authenticating the server but not the
/// client.
pub const SUITE_WIRE_V1: &str = "w1";

/// Recommended toolset for network communication.
pub const RECOMMENDED_NETWORK: &[&str] = &["ECDH-X25519", "HKDF(SHA2-256)", "CHACHA20-POLY1305"];
/// Recommended toolset for password-protected storage.
pub const RECOMMENDED_STORAGE_PASSWORD: &[&str] =
    &["PBKDF2-SHA2-256", "HKDF(SHA2-256)", "CHACHA20-POLY1305"];
/// Recommended toolset for key-protected storage.
pub const RECOMMENDED_STORAGE_KEY: &[&str] = &["HKDF(SHA2-256)", "CHACHA20-POLY1305"];
/// Recommended toolset for storage encrypted to a recipient.
pub const RECOMMENDED_STORAGE_RECIPIENT: &[&str] =
    &["ECDH-X25519", "HKDF(SHA2-256)", "CHACHA20-POLY1305"];
/// Recommended toolset for signing.
pub const RECOMMENDED_SIGNING: &[&str] = &["Ed25519(SHA2-256)"];

static SUITES: Lazy<BTreeMap<&'static str, Suite>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for suite in v1_suites() {
        map.insert(suite.id, suite);
    }
    map
});

fn v1_suites() -> Vec<Suite> {
    vec![
        Suite {
            id: SUITE_KEY_V1,
            tools: &["HKDF(BLAKE2b-256)", "CHACHA20-POLY1305"],
            provides: Requirements::all(),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
        Suite {
            id: SUITE_PASSWORD_V1,
            tools: &["PBKDF2-SHA2-256", "HKDF(BLAKE2b-256)", "CHACHA20-POLY1305"],
            provides: Requirements::all(),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
        Suite {
            id: SUITE_RCPT_ONLY_V1,
            tools: &["ECDH-X25519", "HKDF(BLAKE2b-256)", "CHACHA20-POLY1305"],
            provides: Requirements::all().without(Requirement::SenderAuthentication),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
        Suite {
            id: SUITE_SIGN_V1,
            tools: &["Ed25519(BLAKE2b-256)"],
            provides: Requirements::none()
                .with(Requirement::Integrity)
                .with(Requirement::SenderAuthentication),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
        // SHA2-256 is chosen for better compatibility with other tool sets
        // and workflows.
        Suite {
            id: SUITE_SIGN_FILE_V1,
            tools: &["Ed25519(SHA2-256)"],
            provides: Requirements::none()
                .with(Requirement::Integrity)
                .with(Requirement::SenderAuthentication),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
        Suite {
            id: SUITE_COMPLETE_V1,
            tools: &[
                "ECDH-X25519",
                "Ed25519(BLAKE2b-256)",
                "HKDF(BLAKE2b-256)",
                "CHACHA20-POLY1305",
            ],
            provides: Requirements::all(),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
        Suite {
            id: SUITE_WIRE_V1,
            tools: &["ECDH-X25519", "HKDF(BLAKE2b-256)", "CHACHA20-POLY1305"],
            provides: Requirements::all().without(Requirement::SenderAuthentication),
            security_level: 128,
            status: SuiteStatus::Recommended,
        },
    ]
}

/// Returns the suite with the given id.
pub fn get_suite(suite_id: &str) -> Option<&'static Suite> {
    SUITES.get(suite_id)
}

/// Returns all registered suites, ordered by id.
pub fn suites() -> impl Iterator<Item = &'static Suite> {
    SUITES.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_all_v1_suites() {
        for id in [
            SUITE_KEY_V1,
            SUITE_PASSWORD_V1,
            SUITE_RCPT_ONLY_V1,
            SUITE_SIGN_V1,
            SUITE_SIGN_FILE_V1,
            SUITE_COMPLETE_V1,
            SUITE_WIRE_V1,
        ] {
            assert!(get_suite(id).is_some(), "missing suite {id}");
        }
    }

    #[test]
    fn every_suite_declares_level_and_provides() {
        for suite in suites() {
            assert!(suite.security_level > 0, "suite {} has no security level", suite.id);
            assert!(!suite.provides.is_empty(), "suite {} provides nothing", suite.id);
            assert!(!suite.tools.is_empty(), "suite {} has no tools", suite.id);
        }
    }
}
