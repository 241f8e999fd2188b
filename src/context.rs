// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - Computation Context

//! The explicitly passed computation context: configuration, normalizer,
//! snapshot cache and metrics sink. Tests build isolated instances; nothing
//! here is process-wide.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::AnalysisResult;
use crate::normalizer::RegionNormalizer;
use crate::pipeline::{self, AnalysisRequest, MarketAnalysis};

// ─── Parallel map ────────────────────────────────────────────────────────────

/// Map `f` over `items` on the rayon pool. Output order matches input order.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
pub fn par_map<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    use rayon::prelude::*;
    items.par_iter().map(f).collect()
}

/// Sequential fallback for wasm and `--no-default-features` builds.
#[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
pub fn par_map<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    F: Fn(&T) -> R,
{
    items.iter().map(f).collect()
}

// ─── Snapshot key ────────────────────────────────────────────────────────────

/// Identity of one computation pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotKey {
    pub commodity: String,
    /// `YYYY-MM` or `YYYY-MM-DD`; empty selects the latest month present.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub dataset_version: String,
}

impl SnapshotKey {
    pub fn new(commodity: impl Into<String>, date: impl Into<String>, dataset_version: impl Into<String>) -> Self {
        Self {
            commodity: commodity.into(),
            date: date.into(),
            dataset_version: dataset_version.into(),
        }
    }
}

// ─── Metrics sink ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EngineMetrics {
    passes: AtomicU64,
    cache_hits: AtomicU64,
    evictions: AtomicU64,
    records_rejected: AtomicU64,
    regions_unmatched: AtomicU64,
    sections_unavailable: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub passes: u64,
    pub cache_hits: u64,
    pub evictions: u64,
    pub records_rejected: u64,
    pub regions_unmatched: u64,
    pub sections_unavailable: u64,
}

impl EngineMetrics {
    pub fn record_pass(&self, analysis: &MarketAnalysis) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.records_rejected
            .fetch_add(analysis.diagnostics.rejected.len() as u64, Ordering::Relaxed);
        self.regions_unmatched
            .fetch_add(analysis.diagnostics.unmatched_regions as u64, Ordering::Relaxed);
        self.sections_unavailable
            .fetch_add(analysis.diagnostics.unavailable_sections.len() as u64, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            regions_unmatched: self.regions_unmatched.load(Ordering::Relaxed),
            sections_unavailable: self.sections_unavailable.load(Ordering::Relaxed),
        }
    }
}

// ─── Snapshot cache ──────────────────────────────────────────────────────────

type Slot<V> = Arc<OnceLock<Arc<V>>>;

struct CacheInner<V> {
    slots: HashMap<SnapshotKey, Slot<V>>,
    /// Insertion order, oldest first.
    order: VecDeque<SnapshotKey>,
}

/// Memoizes one result per key. Callers racing on the same key share one
/// slot, and the `OnceLock` inside it runs the computation at most once.
pub struct SnapshotCache<V> {
    capacity: usize,
    inner: Mutex<CacheInner<V>>,
}

/// Whether [`SnapshotCache::get_or_compute`] ran the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Computed,
    Cached,
}

impl<V> SnapshotCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// The slot for `key`, created if absent, plus the number of older
    /// slots evicted to make room.
    fn slot(&self, key: &SnapshotKey) -> (Slot<V>, usize) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get(key) {
            return (Arc::clone(slot), 0);
        }
        let mut evicted = 0;
        while inner.slots.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.slots.remove(&oldest);
            evicted += 1;
        }
        let slot: Slot<V> = Arc::new(OnceLock::new());
        inner.slots.insert(key.clone(), Arc::clone(&slot));
        inner.order.push_back(key.clone());
        (slot, evicted)
    }

    /// Cached value for `key`, computing it with `compute` if needed. The
    /// lock is not held while computing.
    pub fn get_or_compute(&self, key: &SnapshotKey, compute: impl FnOnce() -> V) -> (Arc<V>, Lookup, usize) {
        let (slot, evicted) = self.slot(key);
        let mut lookup = Lookup::Cached;
        let value = slot.get_or_init(|| {
            lookup = Lookup::Computed;
            Arc::new(compute())
        });
        (Arc::clone(value), lookup, evicted)
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<Arc<V>> {
        let inner = self.inner.lock();
        inner.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn invalidate(&self, key: &SnapshotKey) -> bool {
        let mut inner = self.inner.lock();
        inner.order.retain(|k| k != key);
        inner.slots.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── AnalysisContext ─────────────────────────────────────────────────────────

pub struct AnalysisContext {
    config: EngineConfig,
    normalizer: RegionNormalizer,
    cache: SnapshotCache<MarketAnalysis>,
    metrics: EngineMetrics,
}

impl AnalysisContext {
    pub fn new(config: EngineConfig) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self {
            normalizer: config.normalizer(),
            cache: SnapshotCache::new(config.cache_capacity),
            metrics: EngineMetrics::default(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &RegionNormalizer {
        &self.normalizer
    }

    /// Analysis for `request.key`, computed at most once per key while it
    /// stays cached.
    pub fn analyze(&self, request: &AnalysisRequest) -> Arc<MarketAnalysis> {
        let (analysis, lookup, evicted) = self
            .cache
            .get_or_compute(&request.key, || pipeline::run(request, &self.config, &self.normalizer));
        for _ in 0..evicted {
            self.metrics.record_eviction();
        }
        match lookup {
            Lookup::Computed => self.metrics.record_pass(&analysis),
            Lookup::Cached => {
                log::debug!("cache hit for {:?}", request.key);
                self.metrics.record_hit();
            }
        }
        analysis
    }

    /// Run a pass without touching the cache.
    pub fn analyze_uncached(&self, request: &AnalysisRequest) -> MarketAnalysis {
        let analysis = pipeline::run(request, &self.config, &self.normalizer);
        self.metrics.record_pass(&analysis);
        analysis
    }

    /// Drop the result for a superseded key.
    pub fn discard(&self, key: &SnapshotKey) -> bool {
        self.cache.invalidate(key)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached(&self, key: &SnapshotKey) -> Option<Arc<MarketAnalysis>> {
        self.cache.get(key)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
