//! Directory-backed trust store.
//!
//! Signets live as JSON files under `signets/`, envelopes under
//! `envelopes/`. The layout is plain on purpose: a trust store directory
//! can be inspected, backed up, and synced with standard tools. Private
//! signet files are written with owner-only permissions on unix.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use jess_core::{Envelope, JessError, Signet, SignetFilter, TrustStore};

const SIGNET_DIR: &str = "signets";
const ENVELOPE_DIR: &str = "envelopes";

/// A trust store persisting to a directory of JSON files.
pub struct DirTrustStore {
    root: PathBuf,
    // Serializes directory mutations; reads go straight to the fs.
    write_lock: Mutex<()>,
}

impl DirTrustStore {
    /// Opens (and if needed creates) a trust store at the given directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, JessError> {
        let root = root.into();
        fs::create_dir_all(root.join(SIGNET_DIR))?;
        fs::create_dir_all(root.join(ENVELOPE_DIR))?;
        Ok(Self { root, write_lock: Mutex::new(()) })
    }

    /// The directory this store persists to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn signet_path(&self, id: &str, recipient: bool) -> Result<PathBuf, JessError> {
        let kind = if recipient { "recipient" } else { "signet" };
        Ok(self.root.join(SIGNET_DIR).join(format!("{}.{kind}.json", safe_file_name(id)?)))
    }

    fn envelope_path(&self, name: &str) -> Result<PathBuf, JessError> {
        Ok(self.root.join(ENVELOPE_DIR).join(format!("{}.json", safe_file_name(name)?)))
    }

    fn write_json(&self, path: &Path, data: Vec<u8>, private: bool) -> Result<(), JessError> {
        let _guard = self.write_lock.lock().expect("trust store lock poisoned");
        fs::write(path, data)?;

        #[cfg(unix)]
        if private {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        #[cfg(not(unix))]
        let _ = private;

        Ok(())
    }
}

/// Rejects ids that would escape the store directory.
fn safe_file_name(name: &str) -> Result<&str, JessError> {
    if name.is_empty()
        || name.contains(['/', '\\', '\0'])
        || name == "."
        || name == ".."
    {
        return Err(JessError::Format(format!("invalid name for trust store entry: {name:?}")));
    }
    Ok(name)
}

impl TrustStore for DirTrustStore {
    fn get_signet(&self, id: &str, recipient: bool) -> Result<Signet, JessError> {
        let path = self.signet_path(id, recipient)?;
        let data = fs::read(&path).map_err(|_| JessError::MissingSignet { id: id.to_string() })?;
        serde_json::from_slice(&data)
            .map_err(|err| JessError::Format(format!("corrupt signet file {path:?}: {err}")))
    }

    fn store_signet(&self, signet: Signet) -> Result<(), JessError> {
        if signet.id.is_empty() {
            return Err(JessError::Format(
                "signets require an ID to be stored in a trust store".into(),
            ));
        }
        let path = self.signet_path(&signet.id, signet.public)?;
        let data = serde_json::to_vec_pretty(&signet)
            .map_err(|err| JessError::Format(format!("failed to serialize signet: {err}")))?;
        self.write_json(&path, data, !signet.public)
    }

    fn delete_signet(&self, id: &str, recipient: bool) -> Result<(), JessError> {
        let path = self.signet_path(id, recipient)?;
        let _guard = self.write_lock.lock().expect("trust store lock poisoned");
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn select_signets(
        &self,
        filter: SignetFilter,
        schemes: &[&str],
    ) -> Result<Vec<Signet>, JessError> {
        let mut selection = Vec::new();
        for entry in fs::read_dir(self.root.join(SIGNET_DIR))? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(data) = fs::read(&path) else { continue };
            let Ok(signet) = serde_json::from_slice::<Signet>(&data) else {
                tracing::warn!(?path, "skipping unreadable signet file");
                continue;
            };

            if !schemes.is_empty() && !schemes.contains(&signet.scheme.as_str()) {
                continue;
            }
            match filter {
                SignetFilter::Any => {}
                SignetFilter::SignetOnly if signet.public => continue,
                SignetFilter::RecipientOnly if !signet.public => continue,
                _ => {}
            }
            selection.push(signet);
        }
        selection.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.public.cmp(&b.public)));
        Ok(selection)
    }

    fn get_envelope(&self, name: &str) -> Result<Envelope, JessError> {
        let path = self.envelope_path(name)?;
        let data =
            fs::read(&path).map_err(|_| JessError::MissingEnvelope { name: name.to_string() })?;
        serde_json::from_slice(&data)
            .map_err(|err| JessError::Format(format!("corrupt envelope file {path:?}: {err}")))
    }

    fn store_envelope(&self, mut envelope: Envelope) -> Result<(), JessError> {
        if envelope.name.is_empty() {
            return Err(JessError::Format("envelopes require a name to be stored".into()));
        }
        envelope.clean_signets();
        let path = self.envelope_path(&envelope.name)?;
        let data = serde_json::to_vec_pretty(&envelope)
            .map_err(|err| JessError::Format(format!("failed to serialize envelope: {err}")))?;
        self.write_json(&path, data, false)
    }

    fn delete_envelope(&self, name: &str) -> Result<(), JessError> {
        let path = self.envelope_path(name)?;
        let _guard = self.write_lock.lock().expect("trust store lock poisoned");
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn all_envelopes(&self) -> Result<Vec<Envelope>, JessError> {
        let mut envelopes = Vec::new();
        for entry in fs::read_dir(self.root.join(ENVELOPE_DIR))? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let data = fs::read(&path)?;
            match serde_json::from_slice::<Envelope>(&data) {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => tracing::warn!(?path, %err, "skipping unreadable envelope file"),
            }
        }
        envelopes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(envelopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn signet_roundtrip_on_disk() {
        let dir = tempdir().unwrap();
        let store = DirTrustStore::open(dir.path()).unwrap();

        store.store_signet(Signet::key_signet("disk-key", vec![7; 16])).unwrap();

        let loaded = store.get_signet("disk-key", false).unwrap();
        assert_eq!(loaded.key, vec![7; 16]);

        store.delete_signet("disk-key", false).unwrap();
        assert!(store.get_signet("disk-key", false).is_err());
    }

    #[test]
    fn envelope_roundtrip_strips_key_material() {
        let dir = tempdir().unwrap();
        let store = DirTrustStore::open(dir.path()).unwrap();

        let mut envelope = Envelope::new("key_v1");
        envelope.name = "storage".into();
        envelope.secrets.push(Signet::key_signet("k", vec![1; 16]));
        store.store_envelope(envelope).unwrap();

        let loaded = store.get_envelope("storage").unwrap();
        assert_eq!(loaded.name, "storage");
        assert!(loaded.secrets[0].key.is_empty(), "key material must not be persisted");
    }

    #[test]
    fn path_escapes_are_rejected() {
        let dir = tempdir().unwrap();
        let store = DirTrustStore::open(dir.path()).unwrap();
        assert!(store.get_signet("../evil", false).is_err());
        assert!(store.get_envelope("a/b").is_err());
    }

    #[test]
    fn listing_filters_by_scheme() {
        let dir = tempdir().unwrap();
        let store = DirTrustStore::open(dir.path()).unwrap();
        store.store_signet(Signet::key_signet("a", vec![1; 16])).unwrap();

        let mut signing = Signet::new_base("Ed25519");
        signing.id = "b".into();
        signing.key = vec![1; 33];
        store.store_signet(signing).unwrap();

        let keys = store.select_signets(SignetFilter::Any, &["key"]).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].id, "a");
    }
}
