//! Storage backends for the configuration store
//!
//! In-memory by default; sled when built with `sled-backend` and a data path
//! is configured. Entries are never deleted.

use crate::common::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Trait for key-value storage backends
pub trait KVStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Store `value`, returning the value it replaced
    fn put(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>>;
    /// All keys, sorted
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory store (default)
#[derive(Default)]
pub struct MemStore {
    map: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::Internal("store lock poisoned".into())
}

impl KVStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        Ok(self
            .map
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.map.read().map_err(|_| poisoned())?.keys().cloned().collect())
    }
}

/// Sled store
#[cfg(feature = "sled-backend")]
pub struct SledStore {
    db: sled::Db,
}

#[cfg(feature = "sled-backend")]
impl SledStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| Error::Store(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(feature = "sled-backend")]
impl KVStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map(|v| v.map(|ivec| ivec.to_vec()))
            .map_err(|e| Error::Store(e.to_string()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let previous = self
            .db
            .insert(key, value)
            .map_err(|e| Error::Store(e.to_string()))?;
        self.db.flush().map_err(|e| Error::Store(e.to_string()))?;
        Ok(previous.map(|ivec| ivec.to_vec()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.db
            .iter()
            .keys()
            .map(|k| {
                k.map(|k| String::from_utf8_lossy(&k).into_owned())
                    .map_err(|e| Error::Store(e.to_string()))
            })
            .collect()
    }
}

/// Shared handle to a storage backend
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KVStore>,
}

impl Storage {
    pub fn new_memory() -> Self {
        Self {
            backend: Arc::new(MemStore::new()),
        }
    }

    #[cfg(feature = "sled-backend")]
    pub fn new_sled(path: &Path) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(SledStore::open(path)?),
        })
    }

    /// Persistent storage at `data_path`, or memory when `None`
    pub fn open(data_path: Option<&Path>) -> Result<Self> {
        match data_path {
            None => Ok(Self::new_memory()),
            #[cfg(feature = "sled-backend")]
            Some(path) => Self::new_sled(path),
            #[cfg(not(feature = "sled-backend"))]
            Some(path) => Err(Error::InvalidConfig(format!(
                "persistent store at {} requires the sled-backend feature",
                path.display()
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(key)
    }

    pub fn put(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        self.backend.put(key, value)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.backend.keys()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memstore_put_get() {
        let store = MemStore::new();
        assert!(store.get("genesis").unwrap().is_none());
        assert!(store.put("genesis", b"{}".to_vec()).unwrap().is_none());
        assert_eq!(store.get("genesis").unwrap().unwrap(), b"{}");
    }

    #[test]
    fn test_put_reports_replaced_value() {
        let store = Storage::new_memory();
        store.put("wallet", b"a".to_vec()).unwrap();
        let previous = store.put("wallet", b"b".to_vec()).unwrap();
        assert_eq!(previous.unwrap(), b"a");
        assert_eq!(store.get("wallet").unwrap().unwrap(), b"b");
    }

    #[test]
    fn test_keys_sorted() {
        let store = Storage::new_memory();
        for key in ["wallet", "server_2", "genesis", "server_1"] {
            store.put(key, Vec::new()).unwrap();
        }
        assert_eq!(
            store.keys().unwrap(),
            vec!["genesis", "server_1", "server_2", "wallet"]
        );
    }

    #[cfg(not(feature = "sled-backend"))]
    #[test]
    fn test_persistent_requires_feature() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            Storage::open(Some(dir.path())),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[cfg(feature = "sled-backend")]
    #[test]
    fn test_sled_persistence() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = Storage::open(Some(dir.path())).unwrap();
            store.put("genesis", b"g".to_vec()).unwrap();
        }
        let store = Storage::open(Some(dir.path())).unwrap();
        assert_eq!(store.get("genesis").unwrap().unwrap(), b"g");
    }
}
