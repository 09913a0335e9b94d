use serde::Serialize;
use serde_json::Value as SerdeValue;

use crate::error::{Error, ErrorKind, Result};
use crate::json_value::JsonValue;
use crate::registry::Registry;

/// NDJSON line cap, matching the wire protocol's documented limit on a
/// single metadata or data line.
const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct BulkResponseItem {
    pub seq: u64,
    pub action: String,
    pub index: String,
    pub id: String,
    pub status: u16,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkResponse {
    pub took_ms: u128,
    pub errors: bool,
    pub items: Vec<BulkResponseItem>,
}

/// Parses and applies one NDJSON bulk body: alternating metadata and data
/// lines (metadata-only for `delete`), auto-creating indexes that don't
/// exist yet. A malformed or failing record is captured as an error item
/// rather than aborting the remaining stream, per spec §4.9.
pub fn ingest(registry: &Registry, default_shard_count: usize, body: &[u8]) -> Result<BulkResponse> {
    let start = std::time::Instant::now();
    let mut items = Vec::new();
    let mut errors = false;
    let mut seq: u64 = 0;

    let mut lines = body.split(|&b| b == b'\n').peekable();
    while let Some(meta_line) = lines.next() {
        let meta_line = trim_cr(meta_line);
        if meta_line.is_empty() {
            continue;
        }
        seq += 1;

        if meta_line.len() > MAX_LINE_BYTES {
            items.push(error_item(seq, "unknown", String::new(), String::new(), Error::parsing("metadata line exceeds 1 MiB cap")));
            errors = true;
            continue;
        }

        let (action, index_name, id, needs_data) = match parse_metadata(meta_line) {
            Ok(parsed) => parsed,
            Err(e) => {
                items.push(error_item(seq, "unknown", String::new(), String::new(), e));
                errors = true;
                continue;
            }
        };

        let data_line = if needs_data { lines.next().map(trim_cr) } else { None };

        let outcome = apply_record(registry, default_shard_count, &action, &index_name, id.clone(), data_line);
        match outcome {
            Ok(final_id) => items.push(BulkResponseItem {
                seq,
                action,
                index: index_name,
                id: final_id,
                status: 200,
                error: None,
            }),
            Err(e) => {
                errors = true;
                items.push(error_item(seq, &action, index_name, id.unwrap_or_default(), e));
            }
        }
    }

    Ok(BulkResponse { took_ms: start.elapsed().as_millis(), errors, items })
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Returns `(action, index, id, needs_data_line)` or a `ParsingException`
/// for an unrecognized or malformed metadata line (spec §4.9's resolved
/// Open Question: unknown operation keys are reported per-record, not
/// treated as fatal to the batch).
fn parse_metadata(line: &[u8]) -> Result<(String, String, Option<String>, bool)> {
    let value: SerdeValue = serde_json::from_slice(line)?;
    let obj = value.as_object().ok_or_else(|| Error::parsing("bulk metadata line must be a JSON object"))?;
    let (key, body) = obj.iter().next().ok_or_else(|| Error::parsing("bulk metadata line has no operation key"))?;

    let action = match key.as_str() {
        "index" | "create" | "update" | "delete" => key.clone(),
        other => return Err(Error::parsing(format!("unrecognized bulk operation [{other}]"))),
    };

    let index_name = body.get("_index").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let id = body.get("_id").and_then(|v| v.as_str()).map(|s| s.to_string());
    let needs_data = action != "delete";
    Ok((action, index_name, id, needs_data))
}

fn apply_record(
    registry: &Registry,
    default_shard_count: usize,
    action: &str,
    index_name: &str,
    id: Option<String>,
    data_line: Option<&[u8]>,
) -> Result<String> {
    if index_name.is_empty() {
        return Err(Error::parsing("metadata line is missing _index"));
    }
    let index = registry.get_or_create(index_name, default_shard_count)?;

    match action {
        "index" | "create" => {
            let data_line = data_line.ok_or_else(|| Error::parsing("missing data line"))?;
            if data_line.len() > MAX_LINE_BYTES {
                return Err(Error::parsing("data line exceeds 1 MiB cap"));
            }
            let value: SerdeValue = serde_json::from_slice(data_line)?;
            index.create_document(id, JsonValue::from(value))
        }
        "update" => {
            let data_line = data_line.ok_or_else(|| Error::parsing("missing data line"))?;
            let value: SerdeValue = serde_json::from_slice(data_line)?;
            let id = id.ok_or_else(|| Error::parsing("update requires _id"))?;
            index.update_document(&id, JsonValue::from(value))?;
            Ok(id)
        }
        "delete" => {
            let id = id.ok_or_else(|| Error::parsing("delete requires _id"))?;
            index.delete_document(&id)?;
            Ok(id)
        }
        other => Err(Error::parsing(format!("unrecognized bulk operation [{other}]"))),
    }
}

fn error_item(seq: u64, action: &str, index: String, id: String, err: Error) -> BulkResponseItem {
    let status = match err.kind {
        ErrorKind::Parsing | ErrorKind::Validation => 400,
        ErrorKind::IdNotFound => 404,
        ErrorKind::Runtime | ErrorKind::Io => 500,
    };
    BulkResponseItem { seq, action: action.to_string(), index, id, status, error: Some(err.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::NullAnalyzerRegistry;
    use crate::config::Config;
    use crate::metadata_store::DiskMetadataStore;
    use crate::storage::DiskBackend;
    use std::sync::Arc;

    fn registry(dir: &std::path::Path) -> Registry {
        let storage: Arc<dyn crate::storage::StorageBackend> = Arc::new(DiskBackend::new(dir.join("data")));
        let metadata_store: Arc<dyn crate::metadata_store::MetadataStore> =
            Arc::new(DiskMetadataStore::open(dir.join("meta")).unwrap());
        let analyzers = Arc::new(NullAnalyzerRegistry::new());
        Registry::open(Config::default(), storage, metadata_store, analyzers).unwrap()
    }

    #[test]
    fn bulk_index_auto_creates_target_index() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let body = b"{\"index\":{\"_index\":\"orders\",\"_id\":\"1\"}}\n{\"qty\":3}\n";
        let resp = ingest(&registry, 2, body).unwrap();
        assert!(!resp.errors);
        assert_eq!(resp.items.len(), 1);
        assert_eq!(resp.items[0].id, "1");
        assert!(registry.get("orders").unwrap().is_some());
    }

    #[test]
    fn bulk_delete_of_missing_id_is_captured_as_error_without_aborting_batch() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let body = concat!(
            "{\"delete\":{\"_index\":\"orders\",\"_id\":\"missing\"}}\n",
            "{\"index\":{\"_index\":\"orders\",\"_id\":\"2\"}}\n",
            "{\"qty\":1}\n"
        );
        let resp = ingest(&registry, 1, body.as_bytes()).unwrap();
        assert!(resp.errors);
        assert_eq!(resp.items.len(), 2);
        assert_eq!(resp.items[0].status, 404);
        assert_eq!(resp.items[1].status, 200);
    }

    #[test]
    fn unrecognized_operation_key_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let body = b"{\"bogus\":{\"_index\":\"orders\"}}\n";
        let resp = ingest(&registry, 1, body).unwrap();
        assert!(resp.errors);
        assert_eq!(resp.items[0].status, 400);
    }

    #[test]
    fn update_and_delete_round_trip_through_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        let body = concat!(
            "{\"index\":{\"_index\":\"orders\",\"_id\":\"1\"}}\n",
            "{\"qty\":1}\n",
            "{\"update\":{\"_index\":\"orders\",\"_id\":\"1\"}}\n",
            "{\"qty\":2}\n",
            "{\"delete\":{\"_index\":\"orders\",\"_id\":\"1\"}}\n"
        );
        let resp = ingest(&registry, 1, body.as_bytes()).unwrap();
        assert!(!resp.errors);
        assert_eq!(resp.items.len(), 3);
    }
}
