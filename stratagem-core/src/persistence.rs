//! Trade, region and trader persistence.
//!
//! Stores hold plain `serde_json::Value` documents so that a single malformed
//! document can be skipped on restore without losing the others. Decoding and
//! validation happen in the trader.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::warn;

use crate::domain::TradeId;

/// Identity of one strategy trader's documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraderKey {
    pub account: String,
    pub market_id: String,
    pub strategy: String,
}

impl TraderKey {
    pub fn new(account: impl Into<String>, market_id: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self { account: account.into(), market_id: market_id.into(), strategy: strategy.into() }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Trait for persistence backends.
pub trait TradeStore: Send + Sync {
    fn store_trade(&self, key: &TraderKey, id: TradeId, document: &Value) -> Result<(), StoreError>;

    fn delete_trade(&self, key: &TraderKey, id: TradeId) -> Result<(), StoreError>;

    /// Every stored trade document, oldest id first.
    fn load_trades(&self, key: &TraderKey) -> Result<Vec<Value>, StoreError>;

    fn store_regions(&self, key: &TraderKey, document: &Value) -> Result<(), StoreError>;

    fn load_regions(&self, key: &TraderKey) -> Result<Option<Value>, StoreError>;

    fn store_trader(&self, key: &TraderKey, document: &Value) -> Result<(), StoreError>;

    fn load_trader(&self, key: &TraderKey) -> Result<Option<Value>, StoreError>;
}

// ─── In-memory store ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Documents {
    trades: BTreeMap<TradeId, Value>,
    regions: Option<Value>,
    trader: Option<Value>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<TraderKey, Documents>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, key: &TraderKey, f: impl FnOnce(&mut Documents) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(inner.entry(key.clone()).or_default())
    }
}

impl TradeStore for MemoryStore {
    fn store_trade(&self, key: &TraderKey, id: TradeId, document: &Value) -> Result<(), StoreError> {
        self.with(key, |docs| docs.trades.insert(id, document.clone()));
        Ok(())
    }

    fn delete_trade(&self, key: &TraderKey, id: TradeId) -> Result<(), StoreError> {
        self.with(key, |docs| docs.trades.remove(&id));
        Ok(())
    }

    fn load_trades(&self, key: &TraderKey) -> Result<Vec<Value>, StoreError> {
        Ok(self.with(key, |docs| docs.trades.values().cloned().collect()))
    }

    fn store_regions(&self, key: &TraderKey, document: &Value) -> Result<(), StoreError> {
        self.with(key, |docs| docs.regions = Some(document.clone()));
        Ok(())
    }

    fn load_regions(&self, key: &TraderKey) -> Result<Option<Value>, StoreError> {
        Ok(self.with(key, |docs| docs.regions.clone()))
    }

    fn store_trader(&self, key: &TraderKey, document: &Value) -> Result<(), StoreError> {
        self.with(key, |docs| docs.trader = Some(document.clone()));
        Ok(())
    }

    fn load_trader(&self, key: &TraderKey) -> Result<Option<Value>, StoreError> {
        Ok(self.with(key, |docs| docs.trader.clone()))
    }
}

// ─── JSON file store ─────────────────────────────────────────────────

/// One JSON document per trade under `<root>/<account>/<market>/<strategy>/`.
///
/// Files that cannot be parsed are skipped on load (logged, not fatal).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

const TRADE_PREFIX: &str = "trade-";

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, key: &TraderKey) -> PathBuf {
        self.root.join(&key.account).join(&key.market_id).join(&key.strategy)
    }

    fn write(&self, path: PathBuf, document: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(document)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        // Temp file then rename: readers never see a partial document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn read(&self, path: PathBuf) -> Result<Option<Value>, StoreError> {
        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed document");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

impl TradeStore for JsonFileStore {
    fn store_trade(&self, key: &TraderKey, id: TradeId, document: &Value) -> Result<(), StoreError> {
        self.write(self.dir(key).join(format!("{TRADE_PREFIX}{id}.json")), document)
    }

    fn delete_trade(&self, key: &TraderKey, id: TradeId) -> Result<(), StoreError> {
        let path = self.dir(key).join(format!("{TRADE_PREFIX}{id}.json"));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn load_trades(&self, key: &TraderKey) -> Result<Vec<Value>, StoreError> {
        let dir = self.dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut found: Vec<(u64, PathBuf)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter_map(|path| {
                let stem = path.file_name()?.to_str()?.strip_prefix(TRADE_PREFIX)?.strip_suffix(".json")?;
                Some((stem.parse().ok()?, path))
            })
            .collect();
        found.sort_by_key(|(id, _)| *id);

        let mut documents = Vec::with_capacity(found.len());
        for (_, path) in found {
            documents.extend(self.read(path)?);
        }
        Ok(documents)
    }

    fn store_regions(&self, key: &TraderKey, document: &Value) -> Result<(), StoreError> {
        self.write(self.dir(key).join("regions.json"), document)
    }

    fn load_regions(&self, key: &TraderKey) -> Result<Option<Value>, StoreError> {
        self.read(self.dir(key).join("regions.json"))
    }

    fn store_trader(&self, key: &TraderKey, document: &Value) -> Result<(), StoreError> {
        self.write(self.dir(key).join("trader.json"), document)
    }

    fn load_trader(&self, key: &TraderKey) -> Result<Option<Value>, StoreError> {
        self.read(self.dir(key).join("trader.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> TraderKey {
        TraderKey::new("paper", "BTCUSDT", "stratagem")
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.store_trade(&key(), TradeId(2), &json!({"id": 2})).unwrap();
        store.store_trade(&key(), TradeId(1), &json!({"id": 1})).unwrap();
        let ids: Vec<_> = store.load_trades(&key()).unwrap().iter().map(|v| v["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2)]);

        store.delete_trade(&key(), TradeId(1)).unwrap();
        assert_eq!(store.load_trades(&key()).unwrap().len(), 1);
        assert!(store.load_regions(&key()).unwrap().is_none());
        assert!(store.load_trades(&TraderKey::new("other", "BTCUSDT", "s")).unwrap().is_empty());
    }

    #[test]
    fn file_store_layout_and_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.store_trade(&key(), TradeId(10), &json!({"id": 10})).unwrap();
        store.store_trade(&key(), TradeId(9), &json!({"id": 9})).unwrap();
        store.store_regions(&key(), &json!([])).unwrap();

        assert!(dir.path().join("paper/BTCUSDT/stratagem/trade-10.json").exists());
        let ids: Vec<_> = store.load_trades(&key()).unwrap().iter().map(|v| v["id"].clone()).collect();
        assert_eq!(ids, vec![json!(9), json!(10)]);
        assert_eq!(store.load_regions(&key()).unwrap(), Some(json!([])));
    }

    #[test]
    fn file_store_skips_malformed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.store_trade(&key(), TradeId(1), &json!({"id": 1})).unwrap();
        fs::write(dir.path().join("paper/BTCUSDT/stratagem/trade-2.json"), "{not json").unwrap();

        let docs = store.load_trades(&key()).unwrap();
        assert_eq!(docs, vec![json!({"id": 1})]);
    }

    #[test]
    fn file_store_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nowhere"));
        assert!(store.load_trades(&key()).unwrap().is_empty());
        assert!(store.load_trader(&key()).unwrap().is_none());
        store.delete_trade(&key(), TradeId(5)).unwrap();
    }
}
