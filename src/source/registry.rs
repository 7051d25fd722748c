use super::SourceAdapter;
use crate::model::Source;
use std::collections::HashMap;
use std::sync::Arc;

/// Explicit adapter registry.
///
/// Resolution is a plain map lookup; registering an adapter for a source
/// that already has one replaces it, which is what tests rely on to swap
/// a real adapter for a probing or fake one.
#[derive(Default)]
pub struct SourceRegistry {
    adapters: HashMap<Source, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the source it reports.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let source = adapter.source();
        if self.adapters.insert(source, adapter).is_some() {
            tracing::debug!(source = %source, "Replaced registered adapter");
        }
    }

    /// Look up the adapter for a source, if one is registered.
    pub fn resolve(&self, source: Source) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source).cloned()
    }

    /// Sources with a registered adapter, name-ordered for stable output.
    pub fn registered(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.adapters.keys().copied().collect();
        sources.sort_by_key(|s| s.as_str());
        sources
    }
}
