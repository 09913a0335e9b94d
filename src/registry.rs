use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::analyzer::AnalyzerRegistry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::metadata_store::MetadataStore;
use crate::stats::IndexStatsSnapshot;
use crate::storage::StorageBackend;

const VERSION_KEY: &str = "version";
const SCHEMA_VERSION: &[u8] = b"1";

fn marker_key(name: &str) -> String {
    format!("/indexes/{name}")
}

#[derive(Serialize, Deserialize)]
struct IndexMarker {
    primary_shard_count: usize,
}

/// Owns the full set of open `Index`es for one engine instance. Constructed
/// with `Registry::open` rather than held as a process-global singleton, so
/// tests can instantiate independent registries against independent temp
/// directories instead of sharing (and resetting) global state.
pub struct Registry {
    config: Config,
    storage: Arc<dyn StorageBackend>,
    metadata_store: Arc<dyn MetadataStore>,
    analyzer_registry: Arc<dyn AnalyzerRegistry>,
    indexes: RwLock<HashMap<String, Arc<Index>>>,
}

impl Registry {
    pub fn open(
        config: Config,
        storage: Arc<dyn StorageBackend>,
        metadata_store: Arc<dyn MetadataStore>,
        analyzer_registry: Arc<dyn AnalyzerRegistry>,
    ) -> Result<Self> {
        if metadata_store.get(VERSION_KEY)?.is_none() {
            metadata_store.set(VERSION_KEY, SCHEMA_VERSION)?;
        }
        Ok(Registry { config, storage, metadata_store, analyzer_registry, indexes: RwLock::new(HashMap::new()) })
    }

    /// Registers and opens a brand-new index. Errors if `name` is already
    /// registered, whether or not it's currently loaded in memory.
    pub fn create(&self, name: &str, primary_shard_count: usize) -> Result<Arc<Index>> {
        if self.indexes.read().contains_key(name) || self.metadata_store.get(&marker_key(name))?.is_some() {
            return Err(Error::validation(format!("index [{name}] already exists")));
        }

        let index = Arc::new(Index::create(
            name,
            self.config.clone(),
            self.storage.clone(),
            self.metadata_store.clone(),
            self.analyzer_registry.clone(),
            primary_shard_count,
        )?);

        let marker = serde_json::to_vec(&IndexMarker { primary_shard_count })?;
        self.metadata_store.set(&marker_key(name), &marker)?;

        self.indexes.write().insert(name.to_string(), index.clone());
        Ok(index)
    }

    /// Returns the named index, lazily reopening it from the metadata store
    /// if it was registered in an earlier process but isn't loaded yet.
    pub fn get(&self, name: &str) -> Result<Option<Arc<Index>>> {
        if let Some(index) = self.indexes.read().get(name) {
            return Ok(Some(index.clone()));
        }

        let mut indexes = self.indexes.write();
        if let Some(index) = indexes.get(name) {
            return Ok(Some(index.clone()));
        }

        let Some(bytes) = self.metadata_store.get(&marker_key(name))? else { return Ok(None) };
        let marker: IndexMarker = serde_json::from_slice(&bytes)?;
        let index = Arc::new(Index::open(
            name,
            self.config.clone(),
            self.storage.clone(),
            self.metadata_store.clone(),
            self.analyzer_registry.clone(),
            marker.primary_shard_count,
        )?);
        indexes.insert(name.to_string(), index.clone());
        Ok(Some(index))
    }

    /// Returns the named index, creating it with `default_shard_count` on
    /// first sight — the path bulk ingest uses for auto-created indexes.
    pub fn get_or_create(&self, name: &str, default_shard_count: usize) -> Result<Arc<Index>> {
        if let Some(index) = self.get(name)? {
            return Ok(index);
        }
        match self.create(name, default_shard_count) {
            Ok(index) => Ok(index),
            Err(e) if e.kind == crate::error::ErrorKind::Validation => {
                // Lost a race with another caller between the check in
                // `get` and `create`'s own existence check.
                self.get(name)?.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let removed = self.indexes.write().remove(name);
        if let Some(index) = removed {
            index.close()?;
        }
        self.metadata_store.delete(&marker_key(name))?;
        self.metadata_store.delete(&format!("/index/{name}/mapping"))?;
        self.storage.remove_dir(&self.storage.index_dir(name))
    }

    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .metadata_store
            .list("/indexes/")?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix("/indexes/").map(|s| s.to_string()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.list_names()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn list_stat(&self) -> Result<Vec<(String, IndexStatsSnapshot)>> {
        let mut out = Vec::new();
        for name in self.list_names()? {
            if let Some(index) = self.get(&name)? {
                out.push((name, index.stats()));
            }
        }
        Ok(out)
    }

    pub fn close(&self) -> Result<()> {
        for index in self.indexes.write().values() {
            index.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::NullAnalyzerRegistry;
    use crate::json_value::JsonValue;
    use crate::metadata_store::DiskMetadataStore;
    use crate::storage::DiskBackend;
    use serde_json::json;

    fn registry(dir: &std::path::Path) -> Registry {
        let storage: Arc<dyn StorageBackend> = Arc::new(DiskBackend::new(dir.join("data")));
        let metadata_store: Arc<dyn MetadataStore> =
            Arc::new(DiskMetadataStore::open(dir.join("meta")).unwrap());
        let analyzers = Arc::new(NullAnalyzerRegistry::new());
        Registry::open(Config::default(), storage, metadata_store, analyzers).unwrap()
    }

    #[test]
    fn create_then_get_returns_same_index() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create("orders", 2).unwrap();
        assert!(registry.get("orders").unwrap().is_some());
        assert_eq!(registry.list_names().unwrap(), vec!["orders".to_string()]);
    }

    #[test]
    fn create_twice_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create("orders", 1).unwrap();
        assert!(registry.create("orders", 1).is_err());
    }

    #[test]
    fn get_or_create_bootstraps_an_index_on_first_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let index = registry.get_or_create("orders", 4).unwrap();
        index.create_document(Some("a".into()), JsonValue::from(json!({"qty": 1}))).unwrap();
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn reopening_registry_rediscovers_registered_indexes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = registry(dir.path());
            registry.create("orders", 2).unwrap();
            registry.close().unwrap();
        }
        let reopened = registry(dir.path());
        assert_eq!(reopened.list_names().unwrap(), vec!["orders".to_string()]);
        assert!(reopened.get("orders").unwrap().is_some());
    }

    #[test]
    fn delete_removes_index_from_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create("orders", 1).unwrap();
        registry.delete("orders").unwrap();
        assert!(registry.get("orders").unwrap().is_none());
        assert!(registry.is_empty().unwrap());
    }
}
