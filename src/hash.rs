use xxhash_rust::xxh3::xxh3_64;

/// Deterministic, process-stable 64-bit hash used for `hash(docID) mod N`
/// primary-shard routing. xxh3 is seedless and has no per-process state, so
/// the same `(id, N)` pair always routes to the same shard across restarts —
/// shard routing is never itself recorded.
pub fn hash_doc_id(doc_id: &str) -> u64 {
    xxh3_64(doc_id.as_bytes())
}

/// Routes a document ID to a primary shard index in `[0, shard_count)`.
pub fn route(doc_id: &str, shard_count: u64) -> u64 {
    assert!(shard_count > 0, "shard_count must be positive");
    hash_doc_id(doc_id) % shard_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn routing_is_stable_across_calls() {
        let a = route("order-42", 8);
        let b = route("order-42", 8);
        assert_eq!(a, b);
    }

    #[test]
    fn routes_within_bounds() {
        for n in [1u64, 2, 3, 16, 1024] {
            for id in ["a", "b", "some-long-document-id-123"] {
                assert!(route(id, n) < n);
            }
        }
    }

    #[test]
    fn distributes_reasonably_uniformly() {
        let n = 8u64;
        let mut counts: HashMap<u64, u32> = HashMap::new();
        for i in 0..8000 {
            let id = format!("doc-{i}");
            *counts.entry(route(&id, n)).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), n as usize);
        for count in counts.values() {
            assert!(*count > 500 && *count < 1500, "bucket count {count} looks skewed");
        }
    }
}
