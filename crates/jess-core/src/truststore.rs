//! The trust store contract and the in-memory reference implementation.
//!
//! The core only consumes the [`TrustStore`] capability; persistent
//! backends (filesystem directory, OS keyring) live with the callers.
//! Backends may answer listing operations with
//! [`JessError::NotSupportedByTrustStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use crate::envelope::Envelope;
use crate::signet::Signet;
use crate::JessError;

/// Filter for [`TrustStore::select_signets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignetFilter {
    /// Signets and recipients.
    Any,
    /// Only signets holding private or secret material.
    SignetOnly,
    /// Only public recipients.
    RecipientOnly,
}

/// A store of trusted signets and envelopes.
pub trait TrustStore: Send + Sync {
    /// Returns the signet with the given id. `recipient` selects the public
    /// half.
    fn get_signet(&self, id: &str, recipient: bool) -> Result<Signet, JessError>;

    /// Stores a signet. Requires an id.
    fn store_signet(&self, signet: Signet) -> Result<(), JessError>;

    /// Deletes the signet or recipient with the given id.
    fn delete_signet(&self, id: &str, recipient: bool) -> Result<(), JessError>;

    /// Returns signets matching the filter and, if non-empty, one of the
    /// given schemes.
    fn select_signets(
        &self,
        filter: SignetFilter,
        schemes: &[&str],
    ) -> Result<Vec<Signet>, JessError>;

    /// Returns the stored envelope with the given name.
    fn get_envelope(&self, name: &str) -> Result<Envelope, JessError>;

    /// Stores an envelope under its name.
    fn store_envelope(&self, envelope: Envelope) -> Result<(), JessError>;

    /// Deletes the envelope with the given name.
    fn delete_envelope(&self, name: &str) -> Result<(), JessError>;

    /// Returns all stored envelopes.
    fn all_envelopes(&self) -> Result<Vec<Envelope>, JessError>;
}

/// A trust store backed by process memory, primarily for tests and
/// ephemeral setups.
#[derive(Debug, Default)]
pub struct MemTrustStore {
    signets: Mutex<HashMap<String, Signet>>,
    envelopes: Mutex<HashMap<String, Envelope>>,
}

impl MemTrustStore {
    /// Creates an empty in-memory trust store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn storage_id(id: &str, recipient: bool) -> String {
    if recipient {
        format!("{id}.recipient")
    } else {
        format!("{id}.signet")
    }
}

impl TrustStore for MemTrustStore {
    fn get_signet(&self, id: &str, recipient: bool) -> Result<Signet, JessError> {
        let signets = self.signets.lock().expect("trust store lock poisoned");
        signets
            .get(&storage_id(id, recipient))
            .cloned()
            .ok_or_else(|| JessError::MissingSignet { id: id.to_string() })
    }

    fn store_signet(&self, signet: Signet) -> Result<(), JessError> {
        if signet.id.is_empty() {
            return Err(JessError::config(
                "signets require an ID to be stored in a trust store",
            ));
        }

        let mut signets = self.signets.lock().expect("trust store lock poisoned");
        signets.insert(storage_id(&signet.id, signet.public), signet);
        Ok(())
    }

    fn delete_signet(&self, id: &str, recipient: bool) -> Result<(), JessError> {
        let mut signets = self.signets.lock().expect("trust store lock poisoned");
        signets.remove(&storage_id(id, recipient));
        Ok(())
    }

    fn select_signets(
        &self,
        filter: SignetFilter,
        schemes: &[&str],
    ) -> Result<Vec<Signet>, JessError> {
        let signets = self.signets.lock().expect("trust store lock poisoned");
        let mut selection: Vec<Signet> = signets
            .values()
            .filter(|signet| schemes.is_empty() || schemes.contains(&signet.scheme.as_str()))
            .filter(|signet| match filter {
                SignetFilter::Any => true,
                SignetFilter::SignetOnly => !signet.public,
                SignetFilter::RecipientOnly => signet.public,
            })
            .cloned()
            .collect();
        selection.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(selection)
    }

    fn get_envelope(&self, name: &str) -> Result<Envelope, JessError> {
        let envelopes = self.envelopes.lock().expect("trust store lock poisoned");
        envelopes
            .get(name)
            .cloned()
            .ok_or_else(|| JessError::MissingEnvelope { name: name.to_string() })
    }

    fn store_envelope(&self, envelope: Envelope) -> Result<(), JessError> {
        if envelope.name.is_empty() {
            return Err(JessError::config("envelopes require a name to be stored"));
        }

        let mut envelopes = self.envelopes.lock().expect("trust store lock poisoned");
        envelopes.insert(envelope.name.clone(), envelope);
        Ok(())
    }

    fn delete_envelope(&self, name: &str) -> Result<(), JessError> {
        let mut envelopes = self.envelopes.lock().expect("trust store lock poisoned");
        envelopes.remove(name);
        Ok(())
    }

    fn all_envelopes(&self) -> Result<Vec<Envelope>, JessError> {
        let envelopes = self.envelopes.lock().expect("trust store lock poisoned");
        let mut all: Vec<Envelope> = envelopes.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signet_and_recipient_are_stored_separately() {
        let store = MemTrustStore::new();
        store
            .store_signet(Signet {
                id: "a".into(),
                scheme: "Ed25519".into(),
                public: false,
                ..Signet::default()
            })
            .unwrap();
        store
            .store_signet(Signet {
                id: "a".into(),
                scheme: "Ed25519".into(),
                public: true,
                ..Signet::default()
            })
            .unwrap();

        assert!(!store.get_signet("a", false).unwrap().public);
        assert!(store.get_signet("a", true).unwrap().public);

        store.delete_signet("a", false).unwrap();
        assert!(store.get_signet("a", false).is_err());
        assert!(store.get_signet("a", true).is_ok());
    }

    #[test]
    fn missing_signet_error_carries_id() {
        let store = MemTrustStore::new();
        match store.get_signet("ghost", false) {
            Err(JessError::MissingSignet { id }) => assert_eq!(id, "ghost"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn select_filters_by_kind_and_scheme() {
        let store = MemTrustStore::new();
        store
            .store_signet(Signet {
                id: "priv".into(),
                scheme: "Ed25519".into(),
                ..Signet::default()
            })
            .unwrap();
        store
            .store_signet(Signet {
                id: "pub".into(),
                scheme: "Ed25519".into(),
                public: true,
                ..Signet::default()
            })
            .unwrap();
        store
            .store_signet(Signet {
                id: "other".into(),
                scheme: "ECDH-X25519".into(),
                ..Signet::default()
            })
            .unwrap();

        let recipients = store.select_signets(SignetFilter::RecipientOnly, &[]).unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].id, "pub");

        let ed = store.select_signets(SignetFilter::Any, &["Ed25519"]).unwrap();
        assert_eq!(ed.len(), 2);
    }

    #[test]
    fn unnamed_signet_is_rejected() {
        let store = MemTrustStore::new();
        assert!(store.store_signet(Signet::default()).is_err());
    }
}
