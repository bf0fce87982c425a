//! Per-adapter price cache
//!
//! Keyed by raw venue symbol. One writer (the adapter task), any number of
//! readers. Readers always get a full copy taken under a single lock.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{PairPrice, PriceSample};

#[derive(Debug, Default)]
pub struct VenueCache {
    entries: RwLock<HashMap<String, PriceSample>>,
}

impl VenueCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are plain data; a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PriceSample>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PriceSample>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the entry for one raw symbol
    pub fn upsert(&self, sample: PriceSample) {
        if !sample.is_valid() {
            return;
        }
        self.write().insert(sample.symbol.clone(), sample);
    }

    /// Merge a batch under one write lock. Returns how many entries changed.
    pub fn merge(&self, samples: impl IntoIterator<Item = PriceSample>) -> usize {
        let valid: Vec<PriceSample> = samples.into_iter().filter(PriceSample::is_valid).collect();
        let n = valid.len();
        let mut entries = self.write();
        for sample in valid {
            entries.insert(sample.symbol.clone(), sample);
        }
        n
    }

    /// Copy of every sample, keyed by raw symbol
    pub fn snapshot(&self) -> HashMap<String, PriceSample> {
        self.read().clone()
    }

    /// Snapshot re-keyed by canonical pair
    ///
    /// When two raw symbols normalize to the same pair the newer observation
    /// wins.
    pub fn pair_prices(&self) -> HashMap<String, PairPrice> {
        let snapshot = self.snapshot();
        let mut out: HashMap<String, PairPrice> = HashMap::with_capacity(snapshot.len());
        for sample in snapshot.into_values() {
            let key = sample.pair.key();
            let newer = out
                .get(&key)
                .map_or(true, |existing| sample.observed_at_ms >= existing.observed_at_ms);
            if newer {
                out.insert(
                    key,
                    PairPrice {
                        pair: sample.pair,
                        price: sample.price,
                        observed_at_ms: sample.observed_at_ms,
                    },
                );
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
