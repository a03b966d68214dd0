//! Cryptographic tools for jess.
//!
//! Every primitive jess can compose is wrapped in a [`Tool`]: a registry
//! entry carrying metadata (purpose, key sizes, security level) and a factory
//! that produces a fresh logic instance for one message operation. The
//! session compiler in `jess-core` sorts instances into typed queues by
//! purpose and drives them through a uniform lifecycle (`setup`, transform,
//! `reset`).
//!
//! The contract is split by purpose instead of one god-trait: key derivation,
//! password derivation, key exchange, key encapsulation, signing, integrated
//! ciphers, plain ciphers, and MACs each get their own trait with exactly the
//! methods that purpose needs. Key management (generate/load/store/burn) is a
//! separate, stateless [`KeyHandler`] exposed for the tools that own key
//! pairs.
//!
//! # Security
//!
//! - Tool instances own their per-message subkeys and zeroize them in
//!   `reset`; the stored-key burn overwrite is best-effort (see
//!   [`burn_bytes`]).
//! - All randomness flows through the process-wide source in [`random`],
//!   which defaults to the OS RNG and can be swapped once at startup.

#![forbid(unsafe_code)]

mod aead;
mod cipher;
mod encapsulation;
mod error;
mod exchange;
mod hashes;
mod kdf;
mod logic;
mod mac;
mod passderiv;
pub mod random;
mod registry;
mod signing;
mod tool;

pub use digest::DynDigest;
pub use error::ToolError;
pub use hashes::{get_hash_tool, hash_tools, DynHasher, HashTool};
pub use logic::{
    burn_bytes, CachedKeys, Cipher, Helper, IntegratedCipher, KeyDeriver, KeyEncapsulator,
    KeyExchanger, KeyHandler, KeySlot, Mac, PassDeriver, Signer, ToolInstance,
};
pub use registry::{get, tools};
pub use tool::{Purpose, Tool, ToolInfo, ToolOption};
