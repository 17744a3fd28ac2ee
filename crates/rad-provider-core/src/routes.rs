use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use rad_common::RouteEntry;

/// One concrete (provider, provider-model) pair eligible to serve a
/// logical model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRoute {
    pub provider: String,
    pub provider_model: String,
    pub weight: u32,
    pub priority: i32,
}

type RouteMap = HashMap<String, Vec<CandidateRoute>>;

/// Read-mostly routing table keyed by logical model. Reloads swap the whole
/// map atomically so readers never observe a partial update.
#[derive(Debug)]
pub struct RouterTable {
    inner: ArcSwap<RouteMap>,
}

impl RouterTable {
    pub fn new(entries: &[RouteEntry]) -> Self {
        Self {
            inner: ArcSwap::from_pointee(Self::build(entries)),
        }
    }

    pub fn resolve(&self, model: &str) -> Vec<CandidateRoute> {
        self.inner
            .load()
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    /// Logical models currently routable, for the models listing.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.inner.load().keys().cloned().collect();
        models.sort();
        models
    }

    pub fn replace(&self, entries: &[RouteEntry]) {
        self.inner.store(Arc::new(Self::build(entries)));
    }

    fn build(entries: &[RouteEntry]) -> RouteMap {
        let mut map = RouteMap::new();
        for entry in entries {
            let candidates = entry
                .targets
                .iter()
                .map(|target| CandidateRoute {
                    provider: target.provider.clone(),
                    provider_model: target.provider_model.clone(),
                    weight: target.weight,
                    priority: target.priority,
                })
                .collect();
            map.insert(entry.model.clone(), candidates);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rad_common::RouteTarget;

    fn entry(model: &str, providers: &[&str]) -> RouteEntry {
        RouteEntry {
            model: model.to_string(),
            targets: providers
                .iter()
                .map(|provider| RouteTarget {
                    provider: provider.to_string(),
                    provider_model: format!("{model}-native"),
                    weight: 1,
                    priority: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn resolve_known_and_unknown() {
        let table = RouterTable::new(&[entry("gpt-4o", &["openai-a", "openai-b"])]);
        assert_eq!(table.resolve("gpt-4o").len(), 2);
        assert!(table.resolve("nope").is_empty());
    }

    #[test]
    fn replace_swaps_whole_table() {
        let table = RouterTable::new(&[entry("a", &["p1"])]);
        table.replace(&[entry("b", &["p2"])]);
        assert!(table.resolve("a").is_empty());
        assert_eq!(table.resolve("b").len(), 1);
        assert_eq!(table.models(), vec!["b".to_string()]);
    }
}
