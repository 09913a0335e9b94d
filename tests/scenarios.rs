use std::sync::Arc;

use serde_json::json;

use zinc_index_core::analyzer::NullAnalyzerRegistry;
use zinc_index_core::bulk;
use zinc_index_core::json_value::JsonValue;
use zinc_index_core::mapping::PropertyType;
use zinc_index_core::metadata_store::DiskMetadataStore;
use zinc_index_core::storage::{DiskBackend, StorageBackend};
use zinc_index_core::{Config, Registry};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

fn test_registry(dir: &std::path::Path, config: Config) -> Registry {
    let storage: Arc<dyn StorageBackend> = Arc::new(DiskBackend::new(dir.join("data")));
    let metadata_store = Arc::new(DiskMetadataStore::open(dir.join("meta")).unwrap());
    let analyzers = Arc::new(NullAnalyzerRegistry::new());
    Registry::open(config, storage, metadata_store, analyzers).unwrap()
}

#[test]
fn index_creation_routes_documents_across_primary_shards() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry(dir.path(), Config::default());

    let index = registry.create("orders", 4).unwrap();
    for i in 0..40 {
        let id = format!("order-{i}");
        index.create_document(Some(id), JsonValue::from(json!({"qty": i}))).unwrap();
    }

    assert_eq!(index.stats().doc_count, 40);
}

#[test]
fn bulk_ingest_auto_creates_the_target_index() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry(dir.path(), Config::default());

    let body = concat!(
        "{\"index\":{\"_index\":\"orders\",\"_id\":\"1\"}}\n",
        "{\"qty\":3,\"note\":\"first\"}\n",
        "{\"index\":{\"_index\":\"orders\"}}\n",
        "{\"qty\":4,\"note\":\"auto id\"}\n",
    );
    let resp = bulk::ingest(&registry, 2, body.as_bytes()).unwrap();

    assert!(!resp.errors);
    assert_eq!(resp.items.len(), 2);
    let index = registry.get("orders").unwrap().expect("auto-created");
    assert_eq!(index.stats().doc_count, 2);
}

#[test]
fn timestamp_field_is_auto_mapped_as_date_and_drives_index_stats() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry(dir.path(), Config::default());
    let index = registry.create("events", 1).unwrap();

    index
        .create_document(Some("a".into()), JsonValue::from(json!({"@timestamp": "2023-01-02T03:04:05Z", "level": "info"})))
        .unwrap();
    index
        .create_document(Some("b".into()), JsonValue::from(json!({"@timestamp": "2023-06-15T10:00:00Z", "level": "warn"})))
        .unwrap();

    assert_eq!(index.get_mappings().get("@timestamp").unwrap().property_type, PropertyType::Date);
    let stats = index.stats();
    assert_eq!(stats.doc_count, 2);
    assert!(stats.doc_time_min < stats.doc_time_max);
}

#[test]
fn a_second_tier_shard_rolls_over_once_its_writer_exceeds_max_size() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Config { shard_max_size: 1, ..Config::default() };
    let registry = test_registry(dir.path(), config);
    let index = registry.create("orders", 1).unwrap();

    index.create_document(Some("a".into()), JsonValue::from(json!({"qty": 1}))).unwrap();
    index.check_shards().unwrap();
    index.create_document(Some("b".into()), JsonValue::from(json!({"qty": 2}))).unwrap();

    assert_eq!(index.stats().doc_count, 2);
}

#[test]
fn update_locates_a_document_living_in_an_older_second_tier_shard() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Config { shard_max_size: 1, ..Config::default() };
    let registry = test_registry(dir.path(), config);
    let index = registry.create("orders", 1).unwrap();

    index.create_document(Some("a".into()), JsonValue::from(json!({"qty": 1}))).unwrap();
    index.check_shards().unwrap();
    index.create_document(Some("b".into()), JsonValue::from(json!({"qty": 2}))).unwrap();

    index.update_document("a", JsonValue::from(json!({"qty": 100}))).unwrap();
    assert_eq!(index.stats().doc_count, 3);
}

#[test]
fn deleting_a_document_that_was_never_indexed_reports_id_not_found() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry(dir.path(), Config::default());
    let index = registry.create("orders", 2).unwrap();

    let err = index.delete_document("never-existed").unwrap_err();
    assert!(err.is_id_not_found());
}
