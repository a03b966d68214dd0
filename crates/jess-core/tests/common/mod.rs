//! Shared test fixtures: a populated in-memory trust store and envelope
//! builders for every registered suite.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use jess_core::{
    generate_signet, get_suite, Envelope, MemTrustStore, Signet, Suite, TrustStore,
    SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD,
};
use jess_tools::{random, Purpose};

pub const TEST_DATA: &[u8] = b"The quick brown fox jumps over the lazy dog. ";

pub const TEST_PASSWORD_1: &str = "Jt0gYfUh0mMsWH1jYhOI2SXQ8rKMmu38pkBgDa6p8YlOlae";
pub const TEST_PASSWORD_2: &str = "6+cYgtpM6CYjApRvc+ayx4t4zXJ9PSr80ykp3jmwagATaw4";

/// Builds a trust store holding static keys, passwords, and one key pair
/// per signet-consuming tool.
pub fn test_trust_store() -> MemTrustStore {
    let store = MemTrustStore::new();

    for (id, key_size) in [("test-key-1", 16), ("test-key-2", 16)] {
        let key = random::random_bytes(key_size).unwrap();
        store.store_signet(Signet::key_signet(id, key)).unwrap();
    }

    for (id, password) in [("test-pw-1", TEST_PASSWORD_1), ("test-pw-2", TEST_PASSWORD_2)] {
        store.store_signet(Signet::password_signet(id, password.as_bytes())).unwrap();
    }

    store
}

/// Generates (or reuses) a key pair signet for the given tool and stores
/// both halves.
pub fn ensure_signet(store: &MemTrustStore, tool: &str, id: &str) -> Signet {
    if let Ok(existing) = store.get_signet(id, false) {
        return existing;
    }

    let mut signet = generate_signet(tool).unwrap();
    signet.id = id.to_string();
    signet.store_key().unwrap();

    let mut recipient = signet.as_recipient().unwrap();
    recipient.store_key().unwrap();
    store.store_signet(recipient).unwrap();
    store.store_signet(signet.clone()).unwrap();
    signet
}

/// Builds an envelope for the given suite, creating any needed signets in
/// the trust store the way a user would have configured them.
pub fn envelope_for_suite(store: &MemTrustStore, suite: &'static Suite) -> Envelope {
    let mut envelope = Envelope::new(suite.id);

    let mut uses_password = false;
    let mut async_key_establishment = false;
    let mut has_kdf = false;

    for token in suite.tools {
        let tool_name = token.split('(').next().unwrap();
        let tool = jess_tools::get(tool_name).unwrap();

        match tool.info.purpose {
            Purpose::PassDerivation => {
                uses_password = true;
                envelope.secrets.push(Signet::stub(1, "test-pw-1", SIGNET_SCHEME_PASSWORD));
            }
            Purpose::KeyExchange | Purpose::KeyEncapsulation => {
                async_key_establishment = true;
                let id = format!("test-{tool_name}");
                ensure_signet(store, tool_name, &id);
                envelope.recipients.push(Signet::stub(1, &id, tool_name));
            }
            Purpose::Signing => {
                let id = format!("test-{tool_name}");
                ensure_signet(store, tool_name, &id);
                envelope.senders.push(Signet::stub(1, &id, tool_name));
            }
            Purpose::KeyDerivation => has_kdf = true,
            _ => {}
        }
    }

    // Suites without any other key source get a static key.
    if has_kdf && !uses_password && !async_key_establishment {
        envelope.secrets.push(Signet::stub(1, "test-key-1", SIGNET_SCHEME_KEY));
    }

    envelope
}

/// Convenience lookup that panics on unknown suites.
pub fn suite(id: &str) -> &'static Suite {
    get_suite(id).unwrap_or_else(|| panic!("suite {id} is not registered"))
}
