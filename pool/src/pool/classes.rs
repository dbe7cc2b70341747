//! Partition of a capacity range into power-of-two size classes.

/// Smallest capacity a size class may have.
pub const MIN_CAPACITY: usize = 2;

/// Largest capacity a size class may have.
pub const MAX_CAPACITY: usize = 1 << 31;

/// Returns `ceil(log2(n))`, with `ceil_log2(0) == ceil_log2(1) == 0`.
#[inline]
pub(crate) const fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        return 0;
    }
    usize::BITS - (n - 1).leading_zeros()
}

/// The ordered size classes covering `[min_size, max_size]`.
///
/// Class `i` has capacity `2^(ceil(log2(min_size)) + i)`. When `min_size` (or
/// `max_size`) is not a power of two, the smallest (or largest) class is the next
/// power of two above it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SizeClasses {
    min_size: usize,
    max_size: usize,
    /// `ceil(log2(min_size))`, the exponent of class 0.
    offset: u32,
    count: usize,
}

impl SizeClasses {
    /// Builds the classes for the given bounds, clamping them into
    /// `[MIN_CAPACITY, MAX_CAPACITY]` with `min_size <= max_size`.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        let (min_size, max_size) = Self::clamp(min_size, max_size);
        let offset = ceil_log2(min_size);
        let count = (ceil_log2(max_size) - offset) as usize + 1;
        Self {
            min_size,
            max_size,
            offset,
            count,
        }
    }

    /// Clamps a pair of bounds into the supported range.
    ///
    /// If `min_size` exceeds `max_size` after clamping, it collapses to `max_size`.
    pub const fn clamp(min_size: usize, max_size: usize) -> (usize, usize) {
        let max_size = if max_size > MAX_CAPACITY {
            MAX_CAPACITY
        } else if max_size < MIN_CAPACITY {
            MIN_CAPACITY
        } else {
            max_size
        };
        let min_size = if min_size > max_size {
            max_size
        } else if min_size < MIN_CAPACITY {
            MIN_CAPACITY
        } else {
            min_size
        };
        (min_size, max_size)
    }

    #[inline]
    pub const fn min_size(&self) -> usize {
        self.min_size
    }

    #[inline]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the number of size classes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns the canonical capacity of a class.
    #[inline]
    pub const fn capacity(&self, index: usize) -> usize {
        1 << (self.offset as usize + index)
    }

    /// Returns the class serving a request of `size` bytes.
    ///
    /// Returns None if `size > max_size` (the request bypasses the pool).
    #[inline]
    pub fn for_size(&self, size: usize) -> Option<usize> {
        if size <= self.min_size {
            return Some(0);
        }
        if size == self.max_size {
            return Some(self.count - 1);
        }
        if size > self.max_size {
            return None;
        }
        Some((ceil_log2(size) - self.offset) as usize)
    }

    /// Returns the class a region of exactly `capacity` bytes may be recycled into.
    ///
    /// Returns None if `capacity` is zero, outside `[min_size, max_size]`, or not
    /// the canonical capacity of a class.
    #[inline]
    pub fn for_capacity(&self, capacity: usize) -> Option<usize> {
        if capacity == 0 || capacity < self.min_size || capacity > self.max_size {
            return None;
        }
        let index = (ceil_log2(capacity) - self.offset) as usize;
        if self.capacity(index) == capacity {
            return Some(index);
        }

        // Step down one class and require an exact match there too
        let lower = index.checked_sub(1)?;
        if self.capacity(lower) == capacity {
            return Some(lower);
        }
        None
    }
}
