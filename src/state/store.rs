//! JSON state document persistence.
//!
//! The document looks like `{ "config": {...}, "last_poll_at": ..., "last_signals": [...] }`.
//! Only `config` is interpreted; every other top-level key is carried
//! through load/save unchanged.

use super::settings::Settings;
use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// The full persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub config: Settings,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl Default for StateDocument {
    fn default() -> Self {
        let mut rest = serde_json::Map::new();
        rest.insert("last_poll_at".to_string(), serde_json::Value::Null);
        rest.insert("last_signals".to_string(), serde_json::Value::Array(Vec::new()));
        Self {
            config: Settings::default(),
            rest,
        }
    }
}

impl StateDocument {
    /// Parse a document, accepting a bare config object as older files have it.
    pub fn from_json(raw: &str) -> Result<Self, PersistenceError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let wrapped = value.get("config").is_some_and(|c| c.is_object());
        let mut doc = if wrapped {
            serde_json::from_value::<StateDocument>(value)?
        } else {
            StateDocument {
                config: serde_json::from_value(value)?,
                rest: serde_json::Map::new(),
            }
        };
        doc.config.normalize();
        Ok(doc)
    }
}

/// Where the state document lives.
pub trait ConfigStore: Send + Sync + 'static {
    /// Read the stored document, `Ok(None)` when nothing was saved yet.
    fn load(&self) -> Result<Option<StateDocument>, PersistenceError>;

    /// Replace the stored document.
    fn save(&self, doc: &StateDocument) -> Result<(), PersistenceError>;
}

/// Load the stored document, falling back to defaults on absence or error.
pub fn load_or_default(store: &dyn ConfigStore) -> StateDocument {
    match store.load() {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            info!("No saved state found, starting with default configuration");
            StateDocument::default()
        }
        Err(e) => {
            warn!("Failed to load saved state, using defaults: {}", e);
            StateDocument::default()
        }
    }
}

/// Pretty-printed JSON file, replaced atomically via a temp file and rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<StateDocument>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let doc = StateDocument::from_json(&raw)?;
        info!(
            "Loaded state from {:?}: {} wallets, {} symbols",
            self.path,
            doc.config.wallet_count(),
            doc.config.symbols.len()
        );
        Ok(Some(doc))
    }

    fn save(&self, doc: &StateDocument) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Saved state to {:?}", self.path);
        Ok(())
    }
}

/// Keeps the document in memory only (dry runs).
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<Option<StateDocument>>,
}

impl MemoryStore {
    pub fn new(initial: Option<StateDocument>) -> Self {
        Self {
            doc: Mutex::new(initial),
        }
    }

    /// Last saved document.
    pub fn snapshot(&self) -> Option<StateDocument> {
        self.doc.lock().ok().and_then(|d| d.clone())
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<StateDocument>, PersistenceError> {
        Ok(self.snapshot())
    }

    fn save(&self, doc: &StateDocument) -> Result<(), PersistenceError> {
        if let Ok(mut slot) = self.doc.lock() {
            *slot = Some(doc.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "consensus-radar-{}-{}/config.json",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_missing_file_loads_none() {
        let store = JsonFileStore::new(temp_path("missing"));
        assert!(store.load().unwrap().is_none());
        assert_eq!(load_or_default(&store), StateDocument::default());
    }

    #[test]
    fn test_unknown_top_level_fields_survive_round_trip() {
        let path = temp_path("passthrough");
        let store = JsonFileStore::new(&path);
        let raw = r#"{
            "config": {"wallets": [], "symbols": ["eth"], "consensus_count": 2},
            "last_poll_at": "2024-01-01 00:00:00",
            "last_signals": [{"coin": "ETH"}],
            "dashboard_theme": "dark"
        }"#;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, raw).unwrap();

        let mut doc = store.load().unwrap().unwrap();
        assert_eq!(doc.config.symbols, vec!["ETH"]);
        doc.config.set_consensus(3).unwrap();
        store.save(&doc).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["config"]["consensus_count"], 3);
        assert_eq!(saved["dashboard_theme"], "dark");
        assert_eq!(saved["last_signals"][0]["coin"], "ETH");
        assert_eq!(saved["last_poll_at"], "2024-01-01 00:00:00");

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_bare_config_object_is_accepted() {
        let doc = StateDocument::from_json(r#"{"symbols": ["sol"], "poll_seconds": 30}"#).unwrap();
        assert_eq!(doc.config.symbols, vec!["SOL"]);
        assert_eq!(doc.config.poll_seconds, 30);
    }

    #[test]
    fn test_memory_store_keeps_last_save() {
        let store = MemoryStore::default();
        assert!(store.load().unwrap().is_none());
        let doc = StateDocument::default();
        store.save(&doc).unwrap();
        assert_eq!(store.snapshot(), Some(doc));
    }
}
