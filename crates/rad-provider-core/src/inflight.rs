use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/// Per-candidate in-flight request counters. Increment precedes the call,
/// decrement is guaranteed on guard drop.
#[derive(Debug, Default)]
pub struct InflightCounters {
    map: RwLock<HashMap<(String, String), Arc<AtomicI64>>>,
}

impl InflightCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, provider: &str, model: &str) -> i64 {
        self.map
            .read()
            .expect("inflight lock")
            .get(&(provider.to_string(), model.to_string()))
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn acquire(&self, provider: &str, model: &str) -> InflightGuard {
        let counter = self.counter(provider, model);
        counter.fetch_add(1, Ordering::AcqRel);
        InflightGuard { counter }
    }

    fn counter(&self, provider: &str, model: &str) -> Arc<AtomicI64> {
        if let Some(existing) = self
            .map
            .read()
            .expect("inflight lock")
            .get(&(provider.to_string(), model.to_string()))
        {
            return existing.clone();
        }
        self.map
            .write()
            .expect("inflight lock")
            .entry((provider.to_string(), model.to_string()))
            .or_default()
            .clone()
    }
}

#[derive(Debug)]
pub struct InflightGuard {
    counter: Arc<AtomicI64>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_scopes_the_count() {
        let counters = InflightCounters::new();
        assert_eq!(counters.count("p", "m"), 0);
        {
            let _one = counters.acquire("p", "m");
            let _two = counters.acquire("p", "m");
            assert_eq!(counters.count("p", "m"), 2);
            assert_eq!(counters.count("p", "other"), 0);
        }
        assert_eq!(counters.count("p", "m"), 0);
    }
}
