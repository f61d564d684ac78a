//! Signing-key custody.
//!
//! Keys are addressed by an opaque id. [`FileKeyStore`] writes one file per
//! key, either as a plain text envelope (the format `cardano-cli` reads) or,
//! when a passphrase is configured, as a sealed box whose plaintext is the
//! raw 32-byte key.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chain_ada::{PaymentSigningKey, PaymentVerificationKey};
use crypto_utils::{open, seal_with, KdfParams, SealedBox};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::WalletError;

const KEY_FILE_EXTENSION: &str = "skey";
const MAX_KEY_ID_LEN: usize = 64;

pub trait KeyStore: Send + Sync {
    fn load(&self, key_id: &str) -> Result<PaymentSigningKey, WalletError>;

    /// Persist `key` under `key_id`. Existing keys are never overwritten.
    fn store(&self, key_id: &str, key: &PaymentSigningKey) -> Result<(), WalletError>;

    fn contains(&self, key_id: &str) -> bool;

    /// Generate and persist a fresh key, returning its public half.
    fn generate(&self, key_id: &str) -> Result<PaymentVerificationKey, WalletError> {
        let key = PaymentSigningKey::generate();
        self.store(key_id, &key)?;
        Ok(key.verification_key())
    }
}

/// Ids are used as file names, so only `[a-z0-9_-]` is accepted.
pub fn validate_key_id(key_id: &str) -> Result<(), WalletError> {
    let valid = !key_id.is_empty()
        && key_id.len() <= MAX_KEY_ID_LEN
        && key_id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(WalletError::KeyStore(format!("invalid key id {key_id:?}")))
    }
}

/// Read a signing key from a text-envelope file such as one written by
/// `cardano-cli address key-gen`.
pub fn load_key_file(path: &Path) -> Result<PaymentSigningKey, WalletError> {
    let json = fs::read_to_string(path)
        .map_err(|e| WalletError::KeyStore(format!("read {}: {e}", path.display())))?;
    Ok(PaymentSigningKey::from_text_envelope(&json)?)
}

#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, PaymentSigningKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, key_id: &str) -> Result<PaymentSigningKey, WalletError> {
        self.keys
            .read()
            .get(key_id)
            .cloned()
            .ok_or_else(|| WalletError::KeyStore(format!("unknown key {key_id}")))
    }

    fn store(&self, key_id: &str, key: &PaymentSigningKey) -> Result<(), WalletError> {
        validate_key_id(key_id)?;
        let mut keys = self.keys.write();
        if keys.contains_key(key_id) {
            return Err(WalletError::KeyStore(format!("key {key_id} already exists")));
        }
        keys.insert(key_id.to_string(), key.clone());
        Ok(())
    }

    fn contains(&self, key_id: &str) -> bool {
        self.keys.read().contains_key(key_id)
    }
}

/// One key file per id under a directory.
pub struct FileKeyStore {
    dir: PathBuf,
    passphrase: Option<SecretString>,
    kdf: KdfParams,
}

impl FileKeyStore {
    /// Keys are stored as plain text envelopes unless a passphrase is given.
    pub fn new(dir: impl Into<PathBuf>, passphrase: Option<SecretString>) -> Self {
        Self {
            dir: dir.into(),
            passphrase,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key_id: &str) -> Result<PathBuf, WalletError> {
        validate_key_id(key_id)?;
        Ok(self.dir.join(format!("{key_id}.{KEY_FILE_EXTENSION}")))
    }

    fn encode(&self, key: &PaymentSigningKey) -> Result<String, WalletError> {
        match &self.passphrase {
            Some(passphrase) => {
                let raw = key.to_bytes();
                let sealed = seal_with(&raw[..], passphrase.expose_secret().as_bytes(), self.kdf)?;
                Ok(sealed.to_json()?)
            }
            None => Ok(key.to_text_envelope()?.to_string()),
        }
    }

    fn decode(&self, contents: &str) -> Result<PaymentSigningKey, WalletError> {
        match &self.passphrase {
            Some(passphrase) => {
                let sealed = SealedBox::from_json(contents)?;
                let raw = open(&sealed, passphrase.expose_secret().as_bytes())?;
                Ok(PaymentSigningKey::from_bytes(&raw)?)
            }
            None => Ok(PaymentSigningKey::from_text_envelope(contents)?),
        }
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self, key_id: &str) -> Result<PaymentSigningKey, WalletError> {
        let path = self.path_for(key_id)?;
        let contents = Zeroizing::new(
            fs::read_to_string(&path)
                .map_err(|e| WalletError::KeyStore(format!("read {}: {e}", path.display())))?,
        );
        debug!(key_id, "loaded signing key");
        self.decode(&contents)
    }

    fn store(&self, key_id: &str, key: &PaymentSigningKey) -> Result<(), WalletError> {
        let path = self.path_for(key_id)?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| WalletError::KeyStore(format!("create {}: {e}", self.dir.display())))?;
        let contents = Zeroizing::new(self.encode(key)?);

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path).map_err(|e| {
            WalletError::KeyStore(format!("create {}: {e}", path.display()))
        })?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| WalletError::KeyStore(format!("write {}: {e}", path.display())))?;

        info!(key_id, sealed = self.passphrase.is_some(), "stored signing key");
        Ok(())
    }

    fn contains(&self, key_id: &str) -> bool {
        self.path_for(key_id).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_utils::CryptoError;

    fn fast_kdf() -> KdfParams {
        KdfParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn key_ids_are_restricted() {
        assert!(validate_key_id("addr_0001").is_ok());
        assert!(validate_key_id("master-key").is_ok());
        let long = "x".repeat(65);
        for bad in ["", "../etc/passwd", "Upper", "a/b", "with space", long.as_str()] {
            assert!(validate_key_id(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryKeyStore::new();
        let vkey = store.generate("alice").unwrap();
        assert!(store.contains("alice"));
        assert_eq!(store.load("alice").unwrap().verification_key(), vkey);
        assert!(store.load("bob").is_err());
    }

    #[test]
    fn memory_store_refuses_overwrite() {
        let store = MemoryKeyStore::new();
        store.generate("alice").unwrap();
        let err = store.generate("alice").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn plain_file_store_writes_text_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), None);
        let vkey = store.generate("alice").unwrap();

        let path = dir.path().join("alice.skey");
        let loaded = load_key_file(&path).unwrap();
        assert_eq!(loaded.verification_key(), vkey);
        assert_eq!(store.load("alice").unwrap().verification_key(), vkey);
    }

    #[cfg(unix)]
    #[test]
    fn key_files_are_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), None);
        store.generate("alice").unwrap();
        let mode = fs::metadata(dir.path().join("alice.skey"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn sealed_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), Some(SecretString::from("hunter2".to_string())))
            .with_kdf(fast_kdf());
        let vkey = store.generate("alice").unwrap();

        let contents = fs::read_to_string(dir.path().join("alice.skey")).unwrap();
        assert!(contents.contains("ciphertext"));
        assert!(!contents.contains("cborHex"));
        assert_eq!(store.load("alice").unwrap().verification_key(), vkey);
    }

    #[test]
    fn sealed_file_store_wrong_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        FileKeyStore::new(dir.path(), Some(SecretString::from("right".to_string())))
            .with_kdf(fast_kdf())
            .generate("alice")
            .unwrap();

        let wrong = FileKeyStore::new(dir.path(), Some(SecretString::from("wrong".to_string())));
        let err = wrong.load("alice").unwrap_err();
        assert!(matches!(err, WalletError::Vault(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn file_store_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), None);
        let first = store.generate("alice").unwrap();
        assert!(store.generate("alice").is_err());
        assert_eq!(store.load("alice").unwrap().verification_key(), first);
    }

    #[test]
    fn missing_key_file_is_keystore_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path(), None);
        assert!(!store.contains("ghost"));
        assert!(matches!(store.load("ghost"), Err(WalletError::KeyStore(_))));
    }
}
