//! Authenticated and encrypted messaging built from declarative cipher
//! suites.
//!
//! Small cryptographic primitives ("tools") compose into named suites that
//! collectively deliver a chosen set of security requirements over a
//! message. Two channels are supported: letters (data at rest) and wire
//! sessions (interactive streams with forward-secret rekeying).
//!
//! The flow for closing a letter:
//!
//! ```text
//! Envelope ──compile──▶ Session ──close──▶ Letter
//!    │                     │
//!    │ suite id + signets  │ per message: gather key material,
//!    │                     │ derive subkeys, apply cipher/AEAD/MAC/
//!    │                     │ signature stages in suite order
//! ```
//!
//! Opening reverses it: parse the letter, reconstruct the envelope from its
//! seals, verify signatures, derive keys, reverse the cipher stack, check
//! the MAC, and return the plaintext.
//!
//! # Example
//!
//! ```
//! use jess_core::{Envelope, MemTrustStore, Signet, TrustStore};
//!
//! let store = MemTrustStore::new();
//! let key = jess_tools::random::random_bytes(16).unwrap();
//! store.store_signet(Signet::key_signet("my-key", key)).unwrap();
//!
//! let mut envelope = Envelope::new("key_v1");
//! envelope.secrets.push(Signet::stub(1, "my-key", "key"));
//!
//! let mut session = envelope.correspondence(&store).unwrap();
//! let letter = session.close(b"hello").unwrap();
//! assert_eq!(session.open(&letter).unwrap(), b"hello");
//! ```

#![forbid(unsafe_code)]

mod armor;
mod config;
mod container;
mod envelope;
mod error;
mod letter;
mod password;
mod requirements;
mod session;
mod signet;
mod suite;
mod truststore;

pub use armor::{
    import_text, TextImport, EXPORT_ENVELOPE_KEYWORD, EXPORT_KEY_KEYWORD,
    EXPORT_RECIPIENT_KEYWORD, EXPORT_SENDER_KEYWORD,
};
pub use config::{set_default_key_size, set_minimum_security_level};
pub use container::{Container, ContainerReader};
pub use envelope::Envelope;
pub use error::JessError;
pub use letter::{Letter, Seal};
pub use password::{
    calculate_password_security_level, password_iterations_for_tool, set_password_callbacks,
    CreatePasswordFn, GetPasswordFn,
};
pub use requirements::{Requirement, Requirements};
pub use session::{Session, WireState, WireStatus};
pub use signet::{
    generate_signet, Signet, SignetInfo, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD,
};
pub use suite::{
    get_suite, suites, Suite, SuiteStatus, RECOMMENDED_NETWORK, RECOMMENDED_SIGNING,
    RECOMMENDED_STORAGE_KEY, RECOMMENDED_STORAGE_PASSWORD, RECOMMENDED_STORAGE_RECIPIENT,
    SUITE_COMPLETE_V1, SUITE_KEY_V1, SUITE_PASSWORD_V1, SUITE_RCPT_ONLY_V1, SUITE_SIGN_FILE_V1,
    SUITE_SIGN_V1, SUITE_WIRE_V1,
};
pub use truststore::{MemTrustStore, SignetFilter, TrustStore};

// The tool layer is part of the public surface: callers inspect tools and
// swap the randomness source through it.
pub use jess_tools;
