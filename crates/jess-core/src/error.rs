//! Error types for the composition engine.
//!
//! Kinds are deliberately coarse on the decryption path: AEAD and MAC
//! failures both surface as [`JessError::IntegrityViolation`] so callers
//! cannot tell which stage rejected a letter beyond the tool name.

use thiserror::Error;

use crate::requirements::Requirements;

/// Errors returned by sessions, envelopes, letters, and trust stores.
#[derive(Error, Debug)]
pub enum JessError {
    /// The envelope or suite cannot be compiled into a working pipeline.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The suite does not fulfill the required security properties.
    #[error("missing security requirements: {missing}")]
    UnmetRequirements {
        /// The requirements that are not fulfilled.
        missing: Requirements,
    },

    /// The letter reports a version this implementation does not speak.
    #[error("unsupported letter version: {0}")]
    UnsupportedVersion(u8),

    /// The serialized envelope reports an unknown format version.
    #[error("unsupported format version: {0}")]
    UnsupportedFormat(u64),

    /// A component is weaker than the effective minimum security level.
    #[error("{subject} with a security level of {level} is weaker than the minimum security level of {minimum}")]
    WeakSecurityLevel {
        /// What was checked.
        subject: String,
        /// The computed level of the subject.
        level: i32,
        /// The minimum it was checked against.
        minimum: i32,
    },

    /// A password signet is too weak to be used at all.
    #[error("supplied password signet \"{id}\" is exceptionally weak and should not be used")]
    WeakKey {
        /// Signet id of the offending password.
        id: String,
    },

    /// A primitive or signet reported a negative security level.
    #[error("{subject} is considered broken and should not be used anymore")]
    BrokenPrimitive {
        /// What reported the negative level.
        subject: String,
    },

    /// A referenced signet could not be found.
    #[error("could not find signet {id}")]
    MissingSignet {
        /// The missing signet id.
        id: String,
    },

    /// A referenced envelope could not be found.
    #[error("could not find envelope {name}")]
    MissingEnvelope {
        /// The missing envelope name.
        name: String,
    },

    /// A password signet has no password and no callback could provide one.
    #[error("no password available for signet {id}")]
    PasswordUnavailable {
        /// The signet missing its password.
        id: String,
    },

    /// Signature verification failed.
    #[error("authenticity violation: {0}")]
    AuthenticityViolation(String),

    /// MAC mismatch or AEAD failure.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Reserved for downstream code; the core never raises it.
    #[error("confidentiality violation: {0}")]
    ConfidentialityViolation(String),

    /// The wire state machine received an unexpected message.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A trust store backend does not implement the requested operation.
    #[error("operation not supported by trust store")]
    NotSupportedByTrustStore,

    /// Malformed serialized data.
    #[error("format error: {0}")]
    Format(String),

    /// A primitive operation failed.
    #[error(transparent)]
    Tool(#[from] jess_tools::ToolError),

    /// A collaborator failed with an I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl JessError {
    /// Shorthand for [`JessError::InvalidConfiguration`].
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Shorthand for [`JessError::Format`].
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}
