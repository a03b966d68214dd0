//! The wire format for network correspondences.
//!
//! Version 1 layout, shared by handshake and data messages:
//!
//! ```text
//! varint      wire format version (1)
//! varint      flags: 1 setup msg, 2 sending keys, 4 apply keys
//! varint      letter version        (if setup msg)
//! byte block  suite id              (if setup msg)
//! varint      key count             (if sending keys)
//! repeated    byte block id, byte block value
//! byte block  nonce
//! byte block  data
//! byte block  mac
//! ```

use crate::container::{Container, ContainerReader};
use crate::JessError;

use super::{Letter, Seal};

const WIRE_FORMAT_VERSION: u64 = 1;

const FLAG_SETUP_MSG: u64 = 1;
const FLAG_SENDING_KEYS: u64 = 2;
const FLAG_APPLY_KEYS: u64 = 4;

impl Letter {
    /// Serializes the letter for sending it over a network connection.
    pub fn to_wire(&self) -> Result<Vec<u8>, JessError> {
        let mut c = Container::new();
        c.append_number(WIRE_FORMAT_VERSION);

        let mut flags = 0u64;
        if self.version > 0 {
            flags |= FLAG_SETUP_MSG;
        }
        if !self.keys.is_empty() {
            flags |= FLAG_SENDING_KEYS;
        }
        if self.apply_keys {
            flags |= FLAG_APPLY_KEYS;
        }
        c.append_number(flags);

        if self.version > 0 {
            c.append_number(u64::from(self.version));
            c.append_block(self.suite_id.as_bytes());
        }

        if !self.keys.is_empty() {
            c.append_number(self.keys.len() as u64);
            for seal in &self.keys {
                c.append_block(seal.id.as_bytes());
                c.append_block(&seal.value);
            }
        }

        c.append_block(&self.nonce);
        c.append_block(&self.data);
        c.append_block(&self.mac);

        Ok(c.into_inner())
    }

    /// Parses a letter sent over a network connection.
    pub fn from_wire(data: &[u8]) -> Result<Letter, JessError> {
        let mut reader = ContainerReader::new(data);

        let version = reader.next_number()?;
        if version != WIRE_FORMAT_VERSION {
            return Err(JessError::UnsupportedFormat(version));
        }

        let flags = reader.next_number()?;
        let mut letter = Letter { apply_keys: flags & FLAG_APPLY_KEYS != 0, ..Letter::default() };

        if flags & FLAG_SETUP_MSG != 0 {
            let letter_version = reader.next_number()?;
            letter.version = u8::try_from(letter_version)
                .map_err(|_| JessError::format("letter version exceeds one byte"))?;
            letter.suite_id = String::from_utf8(reader.next_block()?.to_vec())
                .map_err(|_| JessError::format("suite id is not valid utf-8"))?;
        }

        if flags & FLAG_SENDING_KEYS != 0 {
            let count = reader.next_number()? as usize;
            // Bound the allocation by the data actually present.
            if count > reader.remaining() {
                return Err(JessError::format("key count exceeds available data"));
            }
            letter.keys = Vec::with_capacity(count);
            for _ in 0..count {
                let id = String::from_utf8(reader.next_block()?.to_vec())
                    .map_err(|_| JessError::format("seal id is not valid utf-8"))?;
                let value = reader.next_block()?.to_vec();
                letter.keys.push(Seal { scheme: String::new(), id, value });
            }
        }

        letter.nonce = reader.next_block()?.to_vec();
        letter.data = reader.next_block()?.to_vec();
        letter.mac = reader.next_block()?.to_vec();

        Ok(letter)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn wire_letter(
        version: u8,
        suite_id: String,
        keys: Vec<(String, Vec<u8>)>,
        nonce: Vec<u8>,
        data: Vec<u8>,
        mac: Vec<u8>,
        apply_keys: bool,
    ) -> Letter {
        Letter {
            version,
            suite_id: if version > 0 { suite_id } else { String::new() },
            nonce,
            keys: keys
                .into_iter()
                .map(|(id, value)| Seal { scheme: String::new(), id, value })
                .collect(),
            data,
            mac,
            signatures: Vec::new(),
            apply_keys,
        }
    }

    proptest! {
        #[test]
        fn wire_roundtrip(
            version in 0u8..=1,
            suite_id in "[a-z0-9_]{1,12}",
            keys in prop::collection::vec(("[a-z0-9-]{0,8}", prop::collection::vec(any::<u8>(), 0..64)), 0..4),
            nonce in prop::collection::vec(any::<u8>(), 0..16),
            data in prop::collection::vec(any::<u8>(), 0..256),
            mac in prop::collection::vec(any::<u8>(), 0..64),
            apply_keys in any::<bool>(),
        ) {
            let letter = wire_letter(version, suite_id, keys, nonce, data, mac, apply_keys);
            let encoded = letter.to_wire().unwrap();
            let decoded = Letter::from_wire(&encoded).unwrap();
            prop_assert_eq!(letter, decoded);
        }
    }

    #[test]
    fn setup_message_carries_version_and_suite() {
        let letter = Letter {
            version: 1,
            suite_id: "w1".into(),
            nonce: vec![1, 2, 3, 4],
            data: b"payload".to_vec(),
            ..Letter::default()
        };
        let decoded = Letter::from_wire(&letter.to_wire().unwrap()).unwrap();
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.suite_id, "w1");
    }

    #[test]
    fn data_message_omits_version_and_suite() {
        let letter = Letter {
            nonce: vec![1, 2, 3, 4],
            data: b"payload".to_vec(),
            mac: vec![0xDD; 16],
            ..Letter::default()
        };
        let encoded = letter.to_wire().unwrap();
        let decoded = Letter::from_wire(&encoded).unwrap();
        assert_eq!(decoded.version, 0);
        assert!(decoded.suite_id.is_empty());
        assert_eq!(decoded.data, letter.data);
    }

    #[test]
    fn unknown_wire_version_is_rejected() {
        let letter = Letter { nonce: vec![1], ..Letter::default() };
        let mut encoded = letter.to_wire().unwrap();
        encoded[0] = 9;
        assert!(matches!(Letter::from_wire(&encoded), Err(JessError::UnsupportedFormat(9))));
    }

    #[test]
    fn truncated_wire_message_is_rejected() {
        let letter = Letter {
            nonce: vec![1, 2, 3, 4],
            data: b"payload".to_vec(),
            ..Letter::default()
        };
        let encoded = letter.to_wire().unwrap();
        for cut in 1..encoded.len() {
            assert!(
                Letter::from_wire(&encoded[..cut]).is_err(),
                "truncation at {cut} was accepted"
            );
        }
    }

    #[test]
    fn oversized_key_count_is_rejected() {
        let mut c = Container::new();
        c.append_number(WIRE_FORMAT_VERSION);
        c.append_number(FLAG_SENDING_KEYS);
        c.append_number(u64::MAX);
        assert!(Letter::from_wire(c.as_slice()).is_err());
    }
}
