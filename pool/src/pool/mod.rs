//! Size-classed pool of recyclable byte storage.
//!
//! Provides [Cell]s whose storage is recycled through power-of-two size classes
//! instead of being handed back to the allocator.
//!
//! # Thread Safety
//!
//! [CapacityPool] is `Send + Sync` and can be safely shared across threads (clones
//! are cheap handles to the same pool). Allocation and release are lock-free: each
//! size class keeps its free list in a [crossbeam_queue::ArrayQueue].
//!
//! # Size Classes
//!
//! Storage is organized into power-of-two size classes from `min_size` to
//! `max_size`. For example, with `min_size = 4096` and `max_size = 32768`:
//! - Class 0: 4096 bytes
//! - Class 1: 8192 bytes
//! - Class 2: 16384 bytes
//! - Class 3: 32768 bytes
//!
//! Requests are rounded up to the next size class. Requests larger than `max_size`
//! are served by a plain allocation of exactly the requested size, which is never
//! recycled.
//!
//! # Retention
//!
//! Each free list is bounded. Releasing into a full free list drops the storage, so
//! a released cell may never be seen again. Recycled storage is NOT cleared: bytes
//! past the length of a reused cell are whatever its previous holder left there.

use crate::Cell;
use crossbeam_queue::ArrayQueue;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::{num::NonZeroUsize, sync::Arc};
use tracing::{debug, trace, warn};

mod classes;
pub use classes::{MAX_CAPACITY, MIN_CAPACITY};
use classes::SizeClasses;
mod stats;
use stats::PoolMetrics;
pub use stats::{PoolStat, RuntimeSummary};

/// Default lower bound of the pooled range.
pub const DEFAULT_MIN_SIZE: usize = 2;

/// Default upper bound of the pooled range (8 MiB).
pub const DEFAULT_MAX_SIZE: usize = 8 << 20;

/// Configuration for a capacity pool.
///
/// Bounds are clamped rather than rejected: see [Config::bounds].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Smallest pooled capacity. Raised to [MIN_CAPACITY] if smaller.
    pub min_size: usize,
    /// Largest pooled size. Capped at [MAX_CAPACITY].
    pub max_size: usize,
    /// Maximum number of regions retained per size class.
    pub max_per_class: NonZeroUsize,
    /// Maximum number of bytes retained per size class.
    ///
    /// Every class retains at least one region, even if its capacity exceeds this
    /// budget.
    pub max_bytes_per_class: usize,
    /// Whether to fill every free list on pool creation.
    pub prefill: bool,
    /// Whether to collect allocation statistics.
    pub stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SIZE, DEFAULT_MAX_SIZE)
    }
}

impl Config {
    /// Returns a config pooling `[min_size, max_size]` with default retention.
    ///
    /// By default each class retains up to 1024 regions or 64 MiB, whichever is
    /// smaller, nothing is prefilled and statistics are off.
    pub const fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            max_per_class: match NonZeroUsize::new(1024) {
                Some(n) => n,
                None => unreachable!(),
            },
            max_bytes_per_class: 64 << 20,
            prefill: false,
            stats: false,
        }
    }

    /// Returns a config with a single size class of `size` bytes.
    ///
    /// Used for fixed-size stream buffers (see [crate::FixedPool]).
    pub const fn fixed(size: usize) -> Self {
        Self::new(size, size)
    }

    /// Sets whether to collect statistics.
    pub const fn with_stats(mut self, stats: bool) -> Self {
        self.stats = stats;
        self
    }

    /// Sets the per-class retention limits.
    pub const fn with_retention(
        mut self,
        max_per_class: NonZeroUsize,
        max_bytes_per_class: usize,
    ) -> Self {
        self.max_per_class = max_per_class;
        self.max_bytes_per_class = max_bytes_per_class;
        self
    }

    /// Sets whether to fill every free list on pool creation.
    pub const fn with_prefill(mut self, prefill: bool) -> Self {
        self.prefill = prefill;
        self
    }

    /// Returns the effective `(min_size, max_size)`.
    ///
    /// Values below [MIN_CAPACITY] are raised to it, values above [MAX_CAPACITY]
    /// are capped, and if `min_size > max_size` the range collapses to `max_size`.
    pub const fn bounds(&self) -> (usize, usize) {
        SizeClasses::clamp(self.min_size, self.max_size)
    }

    /// Returns the number of regions a class of `capacity` bytes retains.
    fn retention(&self, capacity: usize) -> usize {
        (self.max_bytes_per_class / capacity).clamp(1, self.max_per_class.get())
    }
}

/// Per-size-class state.
struct SizeClass {
    /// The canonical capacity of this class.
    capacity: usize,
    /// Recycled regions, all exactly `capacity` bytes long.
    freelist: ArrayQueue<Box<[u8]>>,
    /// Number of allocations served from `freelist`.
    hits: Counter,
}

impl SizeClass {
    fn new(capacity: usize, retention: usize, prefill: bool, hits: Counter) -> Self {
        let freelist = ArrayQueue::new(retention);
        if prefill {
            for _ in 0..retention {
                let _ = freelist.push(vec![0u8; capacity].into_boxed_slice());
            }
        }
        Self {
            capacity,
            freelist,
            hits,
        }
    }
}

/// Internal state of the capacity pool.
struct Inner {
    config: Config,
    table: SizeClasses,
    classes: Vec<SizeClass>,
    metrics: PoolMetrics,
    readers: crate::reader::ReaderPool,
}

/// A pool of recyclable byte storage, bucketed into power-of-two size classes.
#[derive(Clone)]
pub struct CapacityPool {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CapacityPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacityPool")
            .field("min_size", &self.inner.table.min_size())
            .field("max_size", &self.inner.table.max_size())
            .field("num_classes", &self.inner.classes.len())
            .finish()
    }
}

impl Default for CapacityPool {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl CapacityPool {
    /// Creates a new pool with the given configuration.
    pub fn new(config: Config) -> Self {
        let (min_size, max_size) = config.bounds();
        if (min_size, max_size) != (config.min_size, config.max_size) {
            warn!(
                requested_min = config.min_size,
                requested_max = config.max_size,
                min_size,
                max_size,
                "clamped capacity pool bounds"
            );
        }
        let table = SizeClasses::new(min_size, max_size);

        let metrics = PoolMetrics::new(config.stats);
        let mut classes = Vec::with_capacity(table.len());
        for i in 0..table.len() {
            let capacity = table.capacity(i);
            classes.push(SizeClass::new(
                capacity,
                config.retention(capacity),
                config.prefill,
                metrics.class_hits(capacity),
            ));
        }
        debug!(
            min_size,
            max_size,
            num_classes = classes.len(),
            prefill = config.prefill,
            "created capacity pool"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                table,
                classes,
                metrics,
                readers: crate::reader::ReaderPool::default(),
            }),
        }
    }

    /// Returns a cell of length `size`.
    ///
    /// If `size <= max_size`, the cell's capacity is the capacity of the smallest
    /// class that fits and its storage is recycled when possible. Otherwise the cell
    /// is a plain allocation of exactly `size` bytes.
    ///
    /// # Initialization
    ///
    /// The content of a recycled cell is whatever its previous holder wrote. Do not
    /// read bytes you have not written.
    pub fn alloc(&self, size: usize) -> Cell {
        let Some(index) = self.inner.table.for_size(size) else {
            trace!(size, "allocating outside of pool");
            self.inner.metrics.record_out(size);
            return Cell::zeroed(size, size);
        };

        let class = &self.inner.classes[index];
        match class.freelist.pop() {
            Some(region) => {
                self.inner.metrics.record_reuse(&class.hits, class.capacity);
                Cell::from_region(region, size)
            }
            None => {
                self.inner.metrics.record_new(class.capacity);
                Cell::zeroed(class.capacity, size)
            }
        }
    }

    /// Returns an empty cell that can hold at least `capacity` bytes.
    pub fn make(&self, capacity: usize) -> Cell {
        let mut cell = self.alloc(capacity);
        cell.clear();
        cell
    }

    /// Returns a cell of length `min_size`.
    pub fn alloc_min(&self) -> Cell {
        self.alloc(self.min_size())
    }

    /// Returns a cell of length `max_size`.
    pub fn alloc_max(&self) -> Cell {
        self.alloc(self.max_size())
    }

    /// Returns an empty cell from the smallest class.
    pub fn make_min(&self) -> Cell {
        self.make(self.min_size())
    }

    /// Returns an empty cell from the largest class.
    pub fn make_max(&self) -> Cell {
        self.make(self.max_size())
    }

    /// Returns a cell holding a copy of `data`.
    pub fn copy_from(&self, data: impl AsRef<[u8]>) -> Cell {
        let data = data.as_ref();
        let mut cell = self.make(data.len());
        cell.extend_from_slice(data);
        cell
    }

    /// Appends `data` to `cell`, returning the (possibly new) cell.
    ///
    /// If `cell` lacks room and its capacity is within the pooled range, the content
    /// moves to a pooled cell sized to fit the new length exactly (rounded up to its
    /// class) and the old cell is released. Cells already larger than `max_size`
    /// grow by doubling.
    pub fn append(&self, mut cell: Cell, data: impl AsRef<[u8]>) -> Cell {
        let data = data.as_ref();
        if data.len() <= cell.remaining() {
            cell.extend_from_slice(data);
            return cell;
        }

        let len = cell.len() + data.len();
        let capacity = if cell.capacity() <= self.max_size() {
            len
        } else {
            len.max(cell.capacity().saturating_mul(2))
        };
        let mut grown = self.make(capacity);
        grown.extend_from_slice(&cell);
        grown.extend_from_slice(data);
        self.release(cell);
        grown
    }

    /// Returns `cell`'s storage to the free list of its size class.
    ///
    /// Returns false (and drops the storage) if the capacity is not exactly the
    /// canonical capacity of a class (zero, outside `[min_size, max_size]`, or not a
    /// power of two) or if the class's free list is full.
    pub fn release(&self, cell: Cell) -> bool {
        let capacity = cell.capacity();
        let Some(index) = self.inner.table.for_capacity(capacity) else {
            trace!(capacity, "discarding cell outside of size classes");
            return false;
        };
        let class = &self.inner.classes[index];
        debug_assert_eq!(class.capacity, capacity);
        class.freelist.push(cell.into_region()).is_ok()
    }

    /// Returns the smallest pooled size.
    pub fn min_size(&self) -> usize {
        self.inner.table.min_size()
    }

    /// Returns the largest pooled size.
    pub fn max_size(&self) -> usize {
        self.inner.table.max_size()
    }

    /// Returns the number of size classes.
    pub fn num_classes(&self) -> usize {
        self.inner.classes.len()
    }

    /// Returns the canonical capacities of all size classes, smallest first.
    pub fn class_capacities(&self) -> impl Iterator<Item = usize> + '_ {
        self.inner.classes.iter().map(|class| class.capacity)
    }

    /// Returns the pool configuration (as given, before clamping).
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Enables or disables statistics collection.
    ///
    /// Meant to be set once at startup: toggling while other threads allocate
    /// yields counters that only cover part of the traffic.
    pub fn set_stats(&self, enabled: bool) {
        debug!(enabled, "toggled capacity pool statistics");
        self.inner.metrics.set_enabled(enabled);
    }

    /// Returns whether statistics are collected.
    pub fn stats_enabled(&self) -> bool {
        self.inner.metrics.enabled()
    }

    /// Returns a snapshot of the statistics with the `top_n` most reused classes.
    ///
    /// Returns None if statistics are disabled.
    pub fn summary(&self, top_n: usize) -> Option<RuntimeSummary> {
        self.inner.metrics.summary(self.class_hits(), top_n)
    }

    /// Returns the `top_n` most reused classes.
    ///
    /// Returns an empty list if statistics are disabled or `top_n == 0`.
    pub fn reuse_stats(&self, top_n: usize) -> Vec<PoolStat> {
        if !self.stats_enabled() {
            return Vec::new();
        }
        PoolMetrics::rank(self.class_hits(), top_n)
    }

    /// Registers the pool's counters with a metrics registry.
    ///
    /// Counters only move while statistics are enabled.
    pub fn register(&self, registry: &mut Registry) {
        self.inner
            .metrics
            .register(registry.sub_registry_with_prefix("capacity_pool"));
    }

    fn class_hits(&self) -> impl Iterator<Item = (usize, &Counter)> {
        self.inner
            .classes
            .iter()
            .map(|class| (class.capacity, &class.hits))
    }

    pub(crate) fn readers(&self) -> &crate::reader::ReaderPool {
        &self.inner.readers
    }
}
