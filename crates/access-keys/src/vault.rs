//! Local persistence of access key material.
//!
//! Entries are stored under `accessKey:<lowercase 0x address>` with the value
//! `{"privateKey": "<base64 PKCS#8 DER>"}`. Entries are never removed when an
//! operation using them fails.

use crate::{error::VaultError, keys::AccessKeyMaterial};
use alloy::{hex, primitives::Address};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

const STORAGE_PREFIX: &str = "accessKey:";

/// String key-value storage backing a [`KeyVault`].
pub trait KeyStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError>;

    fn put(&self, key: &str, value: String) -> Result<(), VaultError>;

    fn keys(&self) -> Result<Vec<String>, VaultError>;
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), VaultError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// A JSON object on local disk.
///
/// Writes go to a temporary file in the same directory that is then renamed
/// over the store, so readers never observe a partially written file.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, VaultError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(VaultError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), VaultError> {
        let write_error = |source| VaultError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
        serde_json::to_writer_pretty(&mut file, entries)?;
        file.flush().map_err(write_error)?;
        file.persist(&self.path)
            .map_err(|error| write_error(error.error))?;
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.load()?.remove(key))
    }

    fn put(&self, key: &str, value: String) -> Result<(), VaultError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value);
        self.store(&entries)
    }

    fn keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
    #[serde(rename = "privateKey")]
    private_key: String,
}

/// Access key material addressed by key address.
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn KeyStore>,
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault").finish_non_exhaustive()
    }
}

impl KeyVault {
    pub fn new(store: impl KeyStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryKeyStore::default())
    }

    pub fn storage_key(address: Address) -> String {
        format!("{STORAGE_PREFIX}{}", hex::encode_prefixed(address))
    }

    pub fn put(&self, address: Address, pkcs8_der: &[u8]) -> Result<(), VaultError> {
        let value = serde_json::to_string(&StoredKey {
            private_key: STANDARD.encode(pkcs8_der),
        })?;
        self.store.put(&Self::storage_key(address), value)?;
        debug!(%address, "stored access key");
        Ok(())
    }

    /// PKCS#8 DER bytes stored for `address`.
    pub fn get(&self, address: Address) -> Result<Vec<u8>, VaultError> {
        let value = self
            .store
            .get(&Self::storage_key(address))?
            .ok_or(VaultError::NotFound(address))?;
        let stored: StoredKey = serde_json::from_str(&value)?;
        Ok(STANDARD.decode(stored.private_key)?)
    }

    pub fn store_material(&self, material: &AccessKeyMaterial) -> Result<Address, VaultError> {
        let key_id = material.key_id();
        self.put(key_id, &material.to_pkcs8_der()?)?;
        Ok(key_id)
    }

    pub fn load_material(&self, address: Address) -> Result<AccessKeyMaterial, VaultError> {
        Ok(AccessKeyMaterial::from_pkcs8_der(&self.get(address)?)?)
    }

    /// Addresses of every stored key.
    pub fn list(&self) -> Result<Vec<Address>, VaultError> {
        Ok(self
            .store
            .keys()?
            .iter()
            .filter_map(|key| key.strip_prefix(STORAGE_PREFIX)?.parse().ok())
            .collect())
    }
}
