//! Textual import and export.
//!
//! Signets and envelopes export to base58-encoded CBOR behind a short
//! keyword header (`secret:`, `recipient:`, `sender:`, `envelope:`). The
//! long form carries extra type and name tokens between keyword and
//! payload; the decoder tolerates both.

use crate::envelope::Envelope;
use crate::signet::{Signet, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD};
use crate::JessError;

/// Keyword for exported private signets.
pub const EXPORT_SENDER_KEYWORD: &str = "sender";
/// Keyword for exported public signets.
pub const EXPORT_RECIPIENT_KEYWORD: &str = "recipient";
/// Keyword for exported symmetric keys.
pub const EXPORT_KEY_KEYWORD: &str = "secret";
/// Keyword for exported envelopes.
pub const EXPORT_ENVELOPE_KEYWORD: &str = "envelope";

impl Signet {
    /// Exports the public part of the signet in text format.
    pub fn export(&self, short: bool) -> Result<String, JessError> {
        if self.public {
            return self.to_text_format(short);
        }
        match self.scheme.as_str() {
            // Symmetric keys have no public part; they may only be backed
            // up.
            SIGNET_SCHEME_KEY => Err(JessError::config("cannot export keys")),
            SIGNET_SCHEME_PASSWORD => {
                Err(JessError::config("cannot backup or export passwords"))
            }
            _ => self.as_recipient()?.to_text_format(short),
        }
    }

    /// Exports the private part of the signet in text format.
    pub fn backup(&self, short: bool) -> Result<String, JessError> {
        if self.public {
            return Err(JessError::config("cannot backup (only export) a recipient"));
        }
        self.to_text_format(short)
    }

    fn to_text_format(&self, short: bool) -> Result<String, JessError> {
        let mut signet = self.clone();
        let payload = signet.to_base58()?;

        let (keyword, type_comment) = match (self.scheme.as_str(), self.public) {
            (SIGNET_SCHEME_PASSWORD, _) => {
                return Err(JessError::config("cannot backup or export passwords"))
            }
            (SIGNET_SCHEME_KEY, true) => return Err(JessError::config("cannot export keys")),
            (SIGNET_SCHEME_KEY, false) => {
                (EXPORT_KEY_KEYWORD, "symmetric-key".to_string())
            }
            (scheme, true) => {
                (EXPORT_RECIPIENT_KEYWORD, format!("public-{}-key", to_text_token(scheme)))
            }
            (scheme, false) => {
                (EXPORT_SENDER_KEYWORD, format!("private-{}-key", to_text_token(scheme)))
            }
        };

        if short {
            return Ok(format!("{keyword}:{payload}"));
        }
        let name = self.info.as_ref().map(|info| info.name.as_str()).unwrap_or_default();
        Ok(format!("{keyword}:{type_comment}:{}:{payload}", to_text_token(name)))
    }
}

impl Envelope {
    /// Exports the envelope in text format, with all key material removed.
    pub fn export(&self, short: bool) -> Result<String, JessError> {
        let mut envelope = self.clone();
        let payload = envelope.to_base58()?;

        if short {
            return Ok(format!("{EXPORT_ENVELOPE_KEYWORD}:{payload}"));
        }
        Ok(format!(
            "{EXPORT_ENVELOPE_KEYWORD}:{}:{}:{payload}",
            self.suite_id, self.name
        ))
    }
}

/// Anything the textual import format can carry.
#[derive(Debug)]
pub enum TextImport {
    /// A symmetric key or private signet.
    Signet(Signet),
    /// A public signet.
    Recipient(Signet),
    /// An envelope.
    Envelope(Envelope),
}

/// Parses any supported textual export.
///
/// The payload is always the last colon-separated token; optional type and
/// name tokens between keyword and payload are ignored.
pub fn import_text(text: &str) -> Result<TextImport, JessError> {
    let text = text.trim();
    let (keyword, rest) = text
        .split_once(':')
        .ok_or_else(|| JessError::format("invalid format"))?;
    let payload = rest.rsplit(':').next().unwrap_or_default();
    if payload.is_empty() {
        return Err(JessError::format("invalid format"));
    }

    match keyword {
        EXPORT_KEY_KEYWORD | EXPORT_SENDER_KEYWORD => {
            Ok(TextImport::Signet(Signet::from_base58(payload)?))
        }
        EXPORT_RECIPIENT_KEYWORD => Ok(TextImport::Recipient(Signet::from_base58(payload)?)),
        EXPORT_ENVELOPE_KEYWORD => Ok(TextImport::Envelope(Envelope::from_base58(payload)?)),
        other => Err(JessError::format(format!("unknown import keyword: {other}"))),
    }
}

/// Makes a string compatible with the text format: lowercase, with runs of
/// non-alphanumeric characters collapsed to a dash.
fn to_text_token(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_dash = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signet::generate_signet;

    #[test]
    fn recipient_export_roundtrip() {
        let mut signet = generate_signet("Ed25519").unwrap();
        signet.id = "alice".into();

        let text = signet.export(false).unwrap();
        assert!(text.starts_with("recipient:public-ed25519-key:"), "got {text}");

        match import_text(&text).unwrap() {
            TextImport::Recipient(imported) => {
                assert_eq!(imported.id, "alice");
                assert!(imported.public);
            }
            other => panic!("unexpected import: {other:?}"),
        }
    }

    #[test]
    fn backup_keeps_private_half() {
        let mut signet = generate_signet("ECDH-X25519").unwrap();
        signet.id = "bob".into();

        let text = signet.backup(true).unwrap();
        assert!(text.starts_with("sender:"), "got {text}");

        match import_text(&text).unwrap() {
            TextImport::Signet(imported) => {
                assert_eq!(imported.id, "bob");
                assert!(imported.has_private_key());
            }
            other => panic!("unexpected import: {other:?}"),
        }
    }

    #[test]
    fn short_and_long_forms_parse_alike() {
        let mut signet = generate_signet("Ed25519").unwrap();
        signet.id = "carol".into();

        let short = signet.export(true).unwrap();
        let long = signet.export(false).unwrap();
        assert!(matches!(import_text(&short), Ok(TextImport::Recipient(_))));
        assert!(matches!(import_text(&long), Ok(TextImport::Recipient(_))));
    }

    #[test]
    fn envelope_export_roundtrip() {
        let mut envelope = Envelope::new("v1");
        envelope.name = "mail".into();

        let text = envelope.export(false).unwrap();
        assert!(text.starts_with("envelope:v1:mail:"), "got {text}");

        match import_text(&text).unwrap() {
            TextImport::Envelope(imported) => {
                assert_eq!(imported.name, "mail");
                assert_eq!(imported.suite_id, "v1");
            }
            other => panic!("unexpected import: {other:?}"),
        }
    }

    #[test]
    fn passwords_are_never_exported() {
        let signet = Signet {
            scheme: crate::signet::SIGNET_SCHEME_PASSWORD.into(),
            key: b"hunter2".to_vec(),
            ..Signet::default()
        };
        assert!(signet.export(false).is_err());
        assert!(signet.backup(false).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(import_text("not an export").is_err());
        assert!(import_text("wizard:abc").is_err());
        assert!(import_text("secret:").is_err());
    }
}
