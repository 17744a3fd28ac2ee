use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::warn;

use rad_common::PricingEntry;

#[derive(Debug, Clone, Copy)]
struct Price {
    input_per_mtok: f64,
    output_per_mtok: f64,
}

type PriceMap = HashMap<(String, String), Price>;

/// Pure cost table keyed by (provider, model), dollars per million tokens.
/// Unknown models are matched by suffix-stripping heuristics; if nothing
/// matches, the cost is zero and the model is logged once per process.
#[derive(Debug)]
pub struct PricingTable {
    inner: ArcSwap<PriceMap>,
    warned: Mutex<HashSet<String>>,
}

impl PricingTable {
    pub fn new(entries: &[PricingEntry]) -> Self {
        Self {
            inner: ArcSwap::from_pointee(Self::build(entries)),
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn replace(&self, entries: &[PricingEntry]) {
        self.inner.store(Arc::new(Self::build(entries)));
    }

    pub fn cost(&self, provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let map = self.inner.load();
        let Some(price) = Self::lookup(&map, provider, model) else {
            let mut warned = self.warned.lock().expect("pricing warn lock");
            if warned.insert(model.to_string()) {
                warn!(provider = %provider, model = %model, "no pricing for model, recording zero cost");
            }
            return 0.0;
        };
        (input_tokens as f64 * price.input_per_mtok
            + output_tokens as f64 * price.output_per_mtok)
            / 1_000_000.0
    }

    fn lookup(map: &PriceMap, provider: &str, model: &str) -> Option<Price> {
        if let Some(price) = map.get(&(provider.to_string(), model.to_string())) {
            return Some(*price);
        }
        // Aliases: strip "-latest", then trailing date-like segments
        // (claude-3-5-sonnet-20241022, gpt-4o-2024-08-06).
        if let Some(stripped) = model.strip_suffix("-latest")
            && let Some(price) = map.get(&(provider.to_string(), stripped.to_string()))
        {
            return Some(*price);
        }
        let mut candidate = model;
        while let Some(pos) = candidate.rfind('-') {
            let (head, tail) = candidate.split_at(pos);
            if tail[1..].chars().all(|ch| ch.is_ascii_digit()) {
                candidate = head;
                if let Some(price) = map.get(&(provider.to_string(), candidate.to_string())) {
                    return Some(*price);
                }
            } else {
                break;
            }
        }
        // Longest configured prefix as the last resort.
        map.iter()
            .filter(|((p, m), _)| p == provider && model.starts_with(m.as_str()))
            .max_by_key(|((_, m), _)| m.len())
            .map(|(_, price)| *price)
    }

    fn build(entries: &[PricingEntry]) -> PriceMap {
        entries
            .iter()
            .map(|entry| {
                (
                    (entry.provider.clone(), entry.model.clone()),
                    Price {
                        input_per_mtok: entry.input_per_mtok,
                        output_per_mtok: entry.output_per_mtok,
                    },
                )
            })
            .collect()
    }
}
