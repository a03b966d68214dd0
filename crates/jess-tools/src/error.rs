//! Error types for tool lookup and primitive operations.

use thiserror::Error;

/// Errors raised by the tool registry and primitive adapters.
#[derive(Error, Debug)]
pub enum ToolError {
    /// No tool is registered under the requested name.
    #[error("tool {0} could not be found")]
    NotFound(String),

    /// No hash tool is registered under the requested name.
    #[error("hash tool {0} could not be found")]
    HashToolNotFound(String),

    /// Stored or cached key material does not match the tool's expectations.
    #[error("invalid key")]
    InvalidKey,

    /// A signature did not verify.
    #[error("signature invalid")]
    InvalidSignature,

    /// The signet carries a protection envelope, which cannot be unwrapped
    /// here.
    #[error("protected signets are not supported")]
    Protected,

    /// The tool does not implement the requested operation.
    #[error("{tool} does not support {operation}")]
    NotSupported {
        /// Name of the tool.
        tool: &'static str,
        /// Operation that was requested.
        operation: &'static str,
    },

    /// The tool was instantiated without the hash tool it declared a need
    /// for.
    #[error("{tool} requires a hash tool")]
    HasherRequired {
        /// Name of the tool.
        tool: &'static str,
    },

    /// A key or nonce was requested before the key derivation was
    /// initialized.
    #[error("key derivation is not initialized")]
    KdfNotInitialized,

    /// Key derivation was initialized without a nonce or key material.
    #[error("must supply at least one key and a nonce as key material")]
    MissingKeyMaterial,

    /// A primitive operation failed.
    #[error("{tool}: {message}")]
    Operation {
        /// Name of the tool.
        tool: &'static str,
        /// What went wrong.
        message: String,
    },

    /// The configured randomness source could not deliver enough data.
    #[error("not enough random data available from source")]
    InsufficientRandom,
}

impl ToolError {
    /// Shorthand for [`ToolError::Operation`].
    pub fn op(tool: &'static str, message: impl Into<String>) -> Self {
        Self::Operation { tool, message: message.into() }
    }
}
