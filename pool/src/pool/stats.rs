//! Optional allocation statistics.
//!
//! Counters are [prometheus_client] metrics so they can be exported with
//! [super::CapacityPool::register], but they are also readable directly through
//! [RuntimeSummary] snapshots. While statistics are disabled no counter is touched:
//! the flag is checked once per operation.

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Label for per-class metrics, identifying the size class.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub(crate) struct SizeClassLabel {
    size_class: u64,
}

/// Reuse statistics of one size class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStat {
    /// Position in the ranking (1 = most reused).
    pub rank: usize,
    /// Canonical capacity of the class.
    pub capacity: usize,
    /// Number of allocations served from the class's free list.
    pub reuse_hits: u64,
}

/// Snapshot of a pool's statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeSummary {
    /// Bytes allocated to fill size classes (pool misses).
    pub new_bytes: u64,
    /// Bytes allocated outside the pool (requests above `max_size`).
    pub out_bytes: u64,
    /// Number of allocations outside the pool.
    pub out_count: u64,
    /// Bytes served from free lists (pool hits).
    pub reused_bytes: u64,
    /// Most reused size classes, best first.
    pub top_pools: Vec<PoolStat>,
}

/// Metrics for the capacity pool.
pub(crate) struct PoolMetrics {
    /// Whether counters are updated.
    enabled: AtomicBool,
    /// Total bytes allocated on pool misses.
    new_bytes: Counter,
    /// Total bytes allocated for oversized requests.
    out_bytes: Counter,
    /// Total number of oversized requests.
    out_count: Counter,
    /// Total bytes served from free lists.
    reused_bytes: Counter,
    /// Number of free list hits per size class.
    reuse_hits: Family<SizeClassLabel, Counter>,
}

impl PoolMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            new_bytes: Counter::default(),
            out_bytes: Counter::default(),
            out_count: Counter::default(),
            reused_bytes: Counter::default(),
            reuse_hits: Family::default(),
        }
    }

    /// Returns a handle to the reuse counter of the class with the given capacity.
    ///
    /// The handle shares its value with the labeled family, so incrementing it
    /// does not go through the family's lock.
    pub fn class_hits(&self, capacity: usize) -> Counter {
        let label = SizeClassLabel {
            size_class: capacity as u64,
        };
        self.reuse_hits.get_or_create(&label).clone()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "new_bytes",
            "Total bytes allocated to fill size classes",
            self.new_bytes.clone(),
        );
        registry.register(
            "out_bytes",
            "Total bytes allocated outside the pool for oversized requests",
            self.out_bytes.clone(),
        );
        registry.register(
            "out_count",
            "Total number of oversized requests allocated outside the pool",
            self.out_count.clone(),
        );
        registry.register(
            "reused_bytes",
            "Total bytes served from free lists",
            self.reused_bytes.clone(),
        );
        registry.register(
            "reuse_hits",
            "Number of allocations served from the free list of each size class",
            self.reuse_hits.clone(),
        );
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reuse(&self, hits: &Counter, capacity: usize) {
        if self.enabled() {
            self.reused_bytes.inc_by(capacity as u64);
            hits.inc();
        }
    }

    #[inline]
    pub fn record_new(&self, capacity: usize) {
        if self.enabled() {
            self.new_bytes.inc_by(capacity as u64);
        }
    }

    #[inline]
    pub fn record_out(&self, size: usize) {
        if self.enabled() {
            self.out_bytes.inc_by(size as u64);
            self.out_count.inc();
        }
    }

    /// Builds a snapshot, ranking the given `(capacity, hits)` classes.
    ///
    /// Returns None if statistics are disabled.
    pub fn summary<'a>(
        &self,
        classes: impl Iterator<Item = (usize, &'a Counter)>,
        top_n: usize,
    ) -> Option<RuntimeSummary> {
        if !self.enabled() {
            return None;
        }
        Some(RuntimeSummary {
            new_bytes: self.new_bytes.get(),
            out_bytes: self.out_bytes.get(),
            out_count: self.out_count.get(),
            reused_bytes: self.reused_bytes.get(),
            top_pools: Self::rank(classes, top_n),
        })
    }

    /// Ranks classes by reuse hits (descending, ties broken by capacity), skipping
    /// classes that were never reused.
    pub fn rank<'a>(
        classes: impl Iterator<Item = (usize, &'a Counter)>,
        top_n: usize,
    ) -> Vec<PoolStat> {
        if top_n == 0 {
            return Vec::new();
        }
        let mut hits: Vec<(usize, u64)> = classes
            .map(|(capacity, counter)| (capacity, counter.get()))
            .filter(|(_, hits)| *hits > 0)
            .collect();
        hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.into_iter()
            .take(top_n)
            .enumerate()
            .map(|(i, (capacity, reuse_hits))| PoolStat {
                rank: i + 1,
                capacity,
                reuse_hits,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_records_nothing() {
        let metrics = PoolMetrics::new(false);
        let hits = metrics.class_hits(8);
        metrics.record_new(8);
        metrics.record_reuse(&hits, 8);
        metrics.record_out(100);
        assert_eq!(hits.get(), 0);
        assert!(metrics.summary([(8, &hits)].into_iter(), 1).is_none());

        // Enabling afterwards starts from zero
        metrics.set_enabled(true);
        let summary = metrics.summary([(8, &hits)].into_iter(), 1).unwrap();
        assert_eq!(summary, RuntimeSummary::default());
    }

    #[test]
    fn test_enabled_records() {
        let metrics = PoolMetrics::new(true);
        let hits = metrics.class_hits(8);
        metrics.record_new(8);
        metrics.record_reuse(&hits, 8);
        metrics.record_reuse(&hits, 8);
        metrics.record_out(100);
        metrics.record_out(200);

        let summary = metrics.summary([(8, &hits)].into_iter(), 4).unwrap();
        assert_eq!(summary.new_bytes, 8);
        assert_eq!(summary.reused_bytes, 16);
        assert_eq!(summary.out_bytes, 300);
        assert_eq!(summary.out_count, 2);
        assert_eq!(
            summary.top_pools,
            vec![PoolStat {
                rank: 1,
                capacity: 8,
                reuse_hits: 2
            }]
        );
    }

    #[test]
    fn test_class_hits_shared_with_family() {
        let metrics = PoolMetrics::new(true);
        let hits = metrics.class_hits(64);
        hits.inc();
        assert_eq!(metrics.class_hits(64).get(), 1);
    }

    #[test]
    fn test_rank() {
        let counters: Vec<(usize, Counter)> = [(8, 3), (16, 0), (32, 5), (64, 3), (128, 1)]
            .into_iter()
            .map(|(capacity, hits)| {
                let counter = Counter::default();
                counter.inc_by(hits);
                (capacity, counter)
            })
            .collect();
        let iter = || counters.iter().map(|(c, h)| (*c, h));

        let ranked = PoolMetrics::rank(iter(), 10);
        let order: Vec<_> = ranked.iter().map(|s| (s.rank, s.capacity)).collect();
        assert_eq!(order, vec![(1, 32), (2, 8), (3, 64), (4, 128)]);

        let ranked = PoolMetrics::rank(iter(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].capacity, 8);

        assert!(PoolMetrics::rank(iter(), 0).is_empty());
    }
}
