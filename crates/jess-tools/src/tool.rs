//! Tool descriptors: metadata, purposes, and options.

use crate::hashes::HashTool;
use crate::logic::{KeyHandler, ToolInstance};
use crate::ToolError;

/// What a tool contributes to a suite.
///
/// The session compiler sorts tool instances into typed queues by purpose and
/// derives the security requirements a suite fulfills from the purposes it
/// contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Derives per-message subkeys from established key material.
    KeyDerivation,
    /// Turns a password into a secure key. Provides sender and recipient
    /// authentication.
    PassDerivation,
    /// DH-style key exchange against a trusted recipient key. Provides
    /// recipient authentication.
    KeyExchange,
    /// Wraps a fresh key with the recipient's public key. Provides recipient
    /// authentication.
    KeyEncapsulation,
    /// Signs the message. Provides sender authentication and, because the
    /// signature covers data and associated data, integrity.
    Signing,
    /// Authenticated encryption. Provides confidentiality and integrity.
    IntegratedCipher,
    /// Plain encryption. Provides confidentiality.
    Cipher,
    /// Message authentication. Provides integrity.
    Mac,
}

impl Purpose {
    /// Human readable purpose name, as shown by the CLI tool listing.
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::KeyDerivation => "KeyDerivation",
            Purpose::PassDerivation => "PassDerivation",
            Purpose::KeyExchange => "KeyExchange",
            Purpose::KeyEncapsulation => "KeyEncapsulation",
            Purpose::Signing => "Signing",
            Purpose::IntegratedCipher => "IntegratedCipher",
            Purpose::Cipher => "Cipher",
            Purpose::Mac => "MAC",
        }
    }
}

/// Operational flags a tool can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOption {
    /// The tool could work with streaming data. Reserved; no streaming
    /// pipeline exists yet.
    Streaming,
    /// The tool needs a hash instance that the session feeds with data and
    /// associated data once per direction. Shared between tools requesting
    /// the same hash within one purpose pool.
    NeedsManagedHasher,
    /// The tool needs its own hash instance and does all hashing itself.
    NeedsDedicatedHasher,
    /// The tool requires the session security level to be resolvable.
    NeedsSecurityLevel,
    /// The tool requires the session default key size to be resolvable.
    NeedsDefaultKeySize,
    /// The tool holds per-message state and takes part in the setup/reset
    /// lifecycle.
    HasState,
}

/// Generic information about a tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Unique tool name, referenced by suites.
    pub name: &'static str,
    /// What the tool contributes.
    pub purpose: Purpose,
    /// Declared operational flags.
    pub options: &'static [ToolOption],
    /// Key size in bytes, zero if not applicable.
    pub key_size: usize,
    /// Nonce or IV size in bytes, zero if not applicable.
    pub nonce_size: usize,
    /// Approximate attack complexity as `2^n`. Zero means the level depends
    /// on other inputs (hash tool, key size); negative marks a broken
    /// primitive.
    pub security_level: i32,
    /// Standards reference.
    pub comment: &'static str,
    /// Algorithm author and year.
    pub author: &'static str,
}

impl ToolInfo {
    /// Returns whether the tool declares the given option.
    pub fn has_option(&self, option: ToolOption) -> bool {
        self.options.contains(&option)
    }
}

/// A registered cryptographic tool: shared metadata, an optional static key
/// handler, and a factory for per-message logic instances.
pub struct Tool {
    /// Shared tool information.
    pub info: ToolInfo,
    /// Stateless key management, present for tools that own key pairs
    /// (key exchange, key encapsulation, signing).
    pub key_handler: Option<&'static (dyn KeyHandler)>,
    /// Produces a fresh logic instance. Tools declaring
    /// [`ToolOption::NeedsDedicatedHasher`] require the hash argument.
    pub factory: fn(Option<&'static HashTool>) -> Result<ToolInstance, ToolError>,
}

impl Tool {
    /// Creates a fresh logic instance configured with the given hash tool.
    pub fn new_instance(
        &self,
        hash: Option<&'static HashTool>,
    ) -> Result<ToolInstance, ToolError> {
        (self.factory)(hash)
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("info", &self.info).finish_non_exhaustive()
    }
}
