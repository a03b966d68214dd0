//! The `.letter` file format.
//!
//! Version 1 layout:
//!
//! ```text
//! varint      file format version (1)
//! byte block  header: letter without data as JSON, trailing newline
//! byte block  data
//! ```
//!
//! The header stays human readable so a letter file can be inspected with
//! standard tools.

use crate::container::{Container, ContainerReader};
use crate::JessError;

use super::Letter;

const FILE_FORMAT_VERSION: u64 = 1;

impl Letter {
    /// Serializes the letter for storing it as a file.
    pub fn to_file_format(&self) -> Result<Vec<u8>, JessError> {
        let mut c = Container::new();
        c.append_number(FILE_FORMAT_VERSION);

        // Split header and data.
        let mut header = self.clone();
        header.data = Vec::new();

        let mut header_data = serde_json::to_vec_pretty(&header)
            .map_err(|err| JessError::format(format!("failed to serialize letter: {err}")))?;
        // Trailing newline for better raw viewability.
        header_data.push(b'\n');
        c.append_block(&header_data);

        c.append_block(&self.data);
        Ok(c.into_inner())
    }

    /// Parses a letter stored as a file.
    pub fn from_file_format(data: &[u8]) -> Result<Letter, JessError> {
        let mut reader = ContainerReader::new(data);

        let version = reader.next_number()?;
        if version != FILE_FORMAT_VERSION {
            return Err(JessError::UnsupportedFormat(version));
        }

        let header = reader.next_block()?;
        let mut letter: Letter = serde_json::from_slice(header)
            .map_err(|err| JessError::format(format!("failed to parse letter header: {err}")))?;

        letter.data = reader.next_block()?.to_vec();
        Ok(letter)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Seal;
    use super::*;

    fn sample_letter() -> Letter {
        Letter {
            version: 1,
            suite_id: "key_v1".into(),
            nonce: vec![9, 8, 7, 6],
            keys: vec![Seal { scheme: "key".into(), id: "k1".into(), value: vec![] }],
            data: b"ciphertext bytes".to_vec(),
            mac: vec![0xCC; 32],
            signatures: vec![],
            apply_keys: false,
        }
    }

    #[test]
    fn file_format_roundtrip() {
        let letter = sample_letter();
        let encoded = letter.to_file_format().unwrap();
        let decoded = Letter::from_file_format(&encoded).unwrap();
        assert_eq!(letter, decoded);
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let letter = sample_letter();
        let mut encoded = letter.to_file_format().unwrap();
        encoded[0] = 2;
        assert!(matches!(
            Letter::from_file_format(&encoded),
            Err(JessError::UnsupportedFormat(2))
        ));
    }

    #[test]
    fn header_is_json_with_trailing_newline() {
        let letter = sample_letter();
        let encoded = letter.to_file_format().unwrap();

        let mut reader = ContainerReader::new(&encoded);
        reader.next_number().unwrap();
        let header = reader.next_block().unwrap();
        assert_eq!(header.last(), Some(&b'\n'));
        assert!(serde_json::from_slice::<Letter>(header).is_ok());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let letter = sample_letter();
        let encoded = letter.to_file_format().unwrap();
        assert!(Letter::from_file_format(&encoded[..encoded.len() - 4]).is_err());
    }
}
