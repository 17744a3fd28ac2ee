use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use rad_common::KeyEntry;

/// Identity attached to an authenticated request; `name` lands in usage
/// records, never the secret itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity {
    pub name: String,
}

/// O(1) secret-to-identity lookup supplied by the control plane.
pub trait KeyStore: Send + Sync {
    fn lookup(&self, secret: &str) -> Option<KeyIdentity>;
}

#[derive(Debug, Clone)]
struct KeyRow {
    name: String,
    enabled: bool,
}

/// Snapshot-swapped in-memory keystore.
#[derive(Debug)]
pub struct MemoryKeyStore {
    snapshot: ArcSwap<HashMap<String, KeyRow>>,
}

impl MemoryKeyStore {
    pub fn new(entries: &[KeyEntry]) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Self::build(entries)),
        }
    }

    pub fn replace(&self, entries: &[KeyEntry]) {
        self.snapshot.store(Arc::new(Self::build(entries)));
    }

    fn build(entries: &[KeyEntry]) -> HashMap<String, KeyRow> {
        entries
            .iter()
            .map(|entry| {
                (
                    entry.secret.clone(),
                    KeyRow {
                        name: entry.name.clone(),
                        enabled: entry.enabled,
                    },
                )
            })
            .collect()
    }
}

impl KeyStore for MemoryKeyStore {
    fn lookup(&self, secret: &str) -> Option<KeyIdentity> {
        let snapshot = self.snapshot.load();
        let row = snapshot.get(secret)?;
        if !row.enabled {
            return None;
        }
        Some(KeyIdentity {
            name: row.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_secret() {
        let store = MemoryKeyStore::new(&[KeyEntry {
            name: "team-a".into(),
            secret: "sk-1".into(),
            enabled: true,
        }]);
        assert_eq!(store.lookup("sk-1").unwrap().name, "team-a");
        assert!(store.lookup("sk-2").is_none());
    }

    #[test]
    fn disabled_keys_do_not_match() {
        let store = MemoryKeyStore::new(&[KeyEntry {
            name: "old".into(),
            secret: "sk-old".into(),
            enabled: false,
        }]);
        assert!(store.lookup("sk-old").is_none());
    }
}
