use std::collections::HashMap;
use std::sync::Arc;

/// Marker contract for a named text analyzer. Tokenization, stemming,
/// stopword filtering and language-specific rules are the analyzer
/// registry's own concern and explicitly out of scope here — the indexing
/// core only needs to know an analyzer *name* was resolved to something.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;
}

pub struct PassthroughAnalyzer {
    name: String,
}

impl Analyzer for PassthroughAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Contract the mapping consults when a field declares an `analyzer` name.
pub trait AnalyzerRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>>;
}

/// Reference implementation: resolves every analyzer name to a passthrough
/// stand-in so the crate is runnable and testable without wiring in the
/// real tokenizer pipeline.
pub struct NullAnalyzerRegistry {
    resolved: parking_lot::RwLock<HashMap<String, Arc<dyn Analyzer>>>,
}

impl NullAnalyzerRegistry {
    pub fn new() -> Self {
        NullAnalyzerRegistry { resolved: parking_lot::RwLock::new(HashMap::new()) }
    }
}

impl Default for NullAnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerRegistry for NullAnalyzerRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        if let Some(a) = self.resolved.read().get(name) {
            return Some(a.clone());
        }
        let analyzer: Arc<dyn Analyzer> = Arc::new(PassthroughAnalyzer { name: name.to_string() });
        self.resolved.write().insert(name.to_string(), analyzer.clone());
        Some(analyzer)
    }
}
