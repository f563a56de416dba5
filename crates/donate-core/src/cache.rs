//! best-effort local cache
//!
//! remembers profile display fields and quick-donate preferences per
//! address so the client has something to show before the wallet answers.
//! nothing here is authoritative: missing, stale or corrupt entries read as
//! defaults and failed writes are only logged.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DonateError, Result};

/// minimal key-value backend
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// persistent store using sled
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        info!("opening local cache at {}", path.as_ref().display());
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key.as_bytes())?;
        Ok(())
    }
}

/// in-process store, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// cached public profile fields
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProfile {
    pub name: String,
    pub bio: String,
}

/// quick-donate presets
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonatePreferences {
    /// preset amounts in microcredits
    #[serde(default)]
    pub amounts: Vec<u64>,
    #[serde(default)]
    pub default_message: String,
}

/// per-address cache over any [`KvStore`]
pub struct LocalCache {
    store: Box<dyn KvStore>,
}

impl LocalCache {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::default()))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(SledStore::open(path)?)))
    }

    fn key(kind: &str, address: &str) -> String {
        format!("{}:{}", kind, address.to_lowercase())
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!("cache read {} failed: {}", key, e);
                return T::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("cache entry {} is corrupt, ignoring: {}", key, e);
            T::default()
        })
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_vec(value)
            .map_err(|e| DonateError::Cache(e.to_string()))
            .and_then(|bytes| self.store.put(key, &bytes));
        if let Err(e) = result {
            warn!("cache write {} failed: {}", key, e);
        }
    }

    pub fn profile(&self, address: &str) -> CachedProfile {
        self.read(&Self::key("profile", address))
    }

    pub fn store_profile(&self, address: &str, profile: &CachedProfile) {
        self.write(&Self::key("profile", address), profile)
    }

    pub fn preferences(&self, address: &str) -> DonatePreferences {
        self.read(&Self::key("prefs", address))
    }

    pub fn store_preferences(&self, address: &str, prefs: &DonatePreferences) {
        self.write(&Self::key("prefs", address), prefs)
    }

    /// drop everything cached for `address`
    pub fn forget(&self, address: &str) {
        for kind in ["profile", "prefs"] {
            let key = Self::key(kind, address);
            if let Err(e) = self.store.remove(&key) {
                warn!("cache remove {} failed: {}", key, e);
            }
        }
    }
}
