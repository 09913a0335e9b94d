use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::analyzer::AnalyzerRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::hash;
use crate::json_value::JsonValue;
use crate::mapping::{Mapping, Property};
use crate::metadata_store::MetadataStore;
use crate::pipeline;
use crate::shard::PrimaryShard;
use crate::stats::{IndexStats, IndexStatsSnapshot};
use crate::storage::StorageBackend;
use crate::wal::Action;

fn mapping_key(name: &str) -> String {
    format!("/index/{name}/mapping")
}

/// One index: a fixed-size ring of primary shards plus the mapping,
/// analyzer registry, and stats shared across them. `PrimaryShard` count is
/// chosen at creation time and never changes, per spec §4.5 — resharding is
/// out of scope.
pub struct Index {
    pub name: String,
    config: Config,
    metadata_store: Arc<dyn MetadataStore>,
    mapping: Mapping,
    analyzer_registry: Arc<dyn AnalyzerRegistry>,
    stats: IndexStats,
    primaries: Vec<Arc<PrimaryShard>>,
}

impl Index {
    /// Creates a brand-new index with `primary_shard_count` primary shards,
    /// each starting with a single, empty second-tier shard.
    pub fn create(
        name: &str,
        config: Config,
        storage: Arc<dyn StorageBackend>,
        metadata_store: Arc<dyn MetadataStore>,
        analyzer_registry: Arc<dyn AnalyzerRegistry>,
        primary_shard_count: usize,
    ) -> Result<Self> {
        let primaries = (0..primary_shard_count as i64)
            .map(|id| Arc::new(PrimaryShard::new(id, name, storage.clone(), config.read_goroutine_num)))
            .collect();

        let index = Index {
            name: name.to_string(),
            config,
            metadata_store,
            mapping: Mapping::new(),
            analyzer_registry,
            stats: IndexStats::default(),
            primaries,
        };
        index.persist_mapping()?;
        Ok(index)
    }

    /// Reopens an index whose mapping was previously persisted.
    pub fn open(
        name: &str,
        config: Config,
        storage: Arc<dyn StorageBackend>,
        metadata_store: Arc<dyn MetadataStore>,
        analyzer_registry: Arc<dyn AnalyzerRegistry>,
        primary_shard_count: usize,
    ) -> Result<Self> {
        let mapping = match metadata_store.get(&mapping_key(name))? {
            Some(bytes) => {
                let properties: BTreeMap<String, Property> = serde_json::from_slice(&bytes)?;
                Mapping::load(properties)
            }
            None => Mapping::new(),
        };

        let primaries = (0..primary_shard_count as i64)
            .map(|id| Arc::new(PrimaryShard::new(id, name, storage.clone(), config.read_goroutine_num)))
            .collect();

        Ok(Index {
            name: name.to_string(),
            config,
            metadata_store,
            mapping,
            analyzer_registry,
            stats: IndexStats::default(),
            primaries,
        })
    }

    fn persist_mapping(&self) -> Result<()> {
        let snapshot = self.mapping.snapshot();
        let bytes = serde_json::to_vec(&snapshot)?;
        self.metadata_store.set(&mapping_key(&self.name), &bytes)
    }

    fn primary_for(&self, doc_id: &str) -> &Arc<PrimaryShard> {
        let idx = hash::route(doc_id, self.primaries.len() as u64) as usize;
        &self.primaries[idx]
    }

    /// Inserts a new document, generating a UUID v4 id when `doc_id` is
    /// `None`. Returns the id the document was stored under.
    pub fn create_document(&self, doc_id: Option<String>, doc: JsonValue) -> Result<String> {
        let id = doc_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let primary = self.primary_for(&id);
        self.ingest(primary, &id, Action::Insert, doc, None)?;
        Ok(id)
    }

    /// Updates an existing document in place, on whichever second-tier
    /// shard it currently lives in — not necessarily the latest one.
    pub fn update_document(&self, doc_id: &str, doc: JsonValue) -> Result<()> {
        let primary = self.primary_for(doc_id);
        let second_id = primary.find_shard_by_doc_id(doc_id)?;
        self.ingest(primary, doc_id, Action::Update, doc, Some(second_id))
    }

    /// Tombstones a document. Returns `ErrorKind::IdNotFound` (via
    /// `find_shard_by_doc_id`) if no second-tier shard holds `doc_id`.
    pub fn delete_document(&self, doc_id: &str) -> Result<()> {
        let primary = self.primary_for(doc_id);
        let second_id = primary.find_shard_by_doc_id(doc_id)?;
        self.ingest(primary, doc_id, Action::Delete, JsonValue::Obj(BTreeMap::new()), Some(second_id))
    }

    fn ingest(
        &self,
        primary: &Arc<PrimaryShard>,
        doc_id: &str,
        action: Action,
        doc: JsonValue,
        target_second: Option<i64>,
    ) -> Result<()> {
        primary.open_wal()?;
        let record_shard = target_second.unwrap_or(-1);
        let out = pipeline::process(&self.mapping, &self.config, &self.name, doc_id, action, doc, record_shard)?;

        if out.mapping_dirty {
            self.persist_mapping()?;
        }
        primary.append_wal(&out.record_json)?;

        let second_id = target_second.unwrap_or_else(|| primary.latest_second_id());
        let writer = primary.get_writer(Some(second_id))?;
        match action {
            Action::Insert => writer.add(doc_id, &out.indexed_fields, &out.source_json, out.timestamp_nanos)?,
            Action::Update => writer.update(doc_id, &out.indexed_fields, &out.source_json, out.timestamp_nanos)?,
            Action::Delete => writer.delete(doc_id)?,
        }

        primary.set_timestamp(out.timestamp_nanos);
        self.stats.wal_size.store(self.total_wal_size(), std::sync::atomic::Ordering::Release);
        if action != Action::Delete {
            self.stats.record_document(out.timestamp_nanos);
        }
        Ok(())
    }

    fn total_wal_size(&self) -> u64 {
        self.primaries.iter().map(|p| p.wal_size()).sum()
    }

    /// Checks every primary shard's current writer against
    /// `config.shard_max_size`, rolling over any that exceed it. Meant to be
    /// called periodically (or after every ingest, per the caller's
    /// tradeoff between check frequency and overhead).
    pub fn check_shards(&self) -> Result<()> {
        for primary in &self.primaries {
            primary.check_rollover(self.config.shard_max_size)?;
        }
        Ok(())
    }

    pub fn get_mappings(&self) -> BTreeMap<String, Property> {
        self.mapping.snapshot()
    }

    /// Explicitly registers a field's type ahead of ingest (e.g. from a
    /// create-index request body), instead of leaving it to inference.
    pub fn set_mapping(&self, path: &str, property: Property) -> Result<()> {
        self.mapping.set(path, property)?;
        self.persist_mapping()
    }

    pub fn analyzer_registry(&self) -> &Arc<dyn AnalyzerRegistry> {
        &self.analyzer_registry
    }

    pub fn primary_shard_count(&self) -> usize {
        self.primaries.len()
    }

    pub fn stats(&self) -> IndexStatsSnapshot {
        let mut snap = self.stats.snapshot();
        snap.wal_size = self.total_wal_size();
        snap
    }

    pub fn close(&self) -> Result<()> {
        for primary in &self.primaries {
            primary.close()?;
        }
        Ok(())
    }
}
