use super::Buffer;
use crate::{CapacityPool, Cell, Error, Reader};
use std::{
    io::{self, Write},
    mem,
    ops::Deref,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};
use tracing::{debug, trace};

/// State behind every handle of a [SharedBuffer].
struct Shared {
    /// Number of holders beyond the first.
    ///
    /// The release that moves this from 0 to -1 is the teardown.
    extra: AtomicI64,
    cell: Cell,
    pool: CapacityPool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if self.cell.capacity() > 0 {
            let cell = mem::take(&mut self.cell);
            self.pool.release(cell);
        }
    }
}

/// A frozen, reference-counted [Buffer].
///
/// The producer declares how many holders the buffer is handed to with
/// [SharedBuffer::ref_add] before handing out [SharedBuffer::handle]s (or clones,
/// which are the same thing). Each holder eventually calls [SharedBuffer::release]
/// exactly once; of all these releases, exactly one returns `true`: the one that
/// ends the last declared reference.
///
/// Handles themselves are not counted: dropping one without releasing it leaves
/// the count untouched. A [Reader] is the exception, it declares itself on
/// creation and releases on drop.
///
/// The storage goes back to the pool once the count is exhausted and the last
/// handle is gone, so bytes are never recycled while a handle can still read them.
///
/// # Counting
///
/// The count stored is the number of holders _beyond the first_ (`0` means a
/// single holder). It can be set arbitrarily with [SharedBuffer::ref_store];
/// declaring fewer holders than there are handles only makes more releases report
/// `false` (and makes [SharedBuffer::close] fail), it never frees storage early.
pub struct SharedBuffer {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("extra", &self.ref_value())
            .finish()
    }
}

impl SharedBuffer {
    pub(super) fn new(cell: Cell, pool: CapacityPool) -> Self {
        Self {
            inner: Arc::new(Shared {
                extra: AtomicI64::new(0),
                cell,
                pool,
            }),
        }
    }

    /// Returns the number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.cell.len()
    }

    /// Returns true if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.cell.is_empty()
    }

    /// Returns the capacity of the underlying storage.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.cell.capacity()
    }

    /// Returns the pool the storage returns to.
    pub fn pool(&self) -> &CapacityPool {
        &self.inner.pool
    }

    /// Returns another handle to the same bytes without declaring a new holder.
    ///
    /// Use with [SharedBuffer::ref_add] to hand the buffer to a known number of
    /// holders. Equivalent to [Clone::clone].
    pub fn handle(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }

    /// Increments the number of extra holders.
    pub fn ref_inc(&self) {
        self.ref_add(1);
    }

    /// Decrements the number of extra holders.
    pub fn ref_dec(&self) {
        self.ref_add(-1);
    }

    /// Adds `delta` (possibly negative) to the number of extra holders.
    pub fn ref_add(&self, delta: i64) {
        self.inner.extra.fetch_add(delta, Ordering::AcqRel);
    }

    /// Overwrites the number of extra holders.
    pub fn ref_store(&self, value: i64) {
        self.inner.extra.store(value, Ordering::Release);
    }

    /// Returns the number of extra holders.
    pub fn ref_value(&self) -> i64 {
        self.inner.extra.load(Ordering::Acquire)
    }

    /// Decrements the number of extra holders, returning the previous value.
    pub fn ref_swap_dec(&self) -> i64 {
        self.inner.extra.fetch_sub(1, Ordering::AcqRel)
    }

    /// Resets the number of extra holders to zero.
    pub fn ref_reset(&self) {
        self.ref_store(0);
    }

    /// Gives up this holder's reference.
    ///
    /// Returns `true` for exactly one release: the one that finds no extra holders
    /// left. The storage goes back to the pool when the last handle is dropped.
    pub fn release(self) -> bool {
        let previous = self.ref_swap_dec();
        if previous == 0 {
            trace!(len = self.len(), "released shared buffer");
        }
        previous == 0
    }

    /// Like [SharedBuffer::release], but reports the outcome as a result.
    ///
    /// Succeeds only for the close that tears the buffer down. Returns
    /// [Error::StillShared] if other holders remain and [Error::AlreadyReleased]
    /// if the buffer was already torn down.
    pub fn close(self) -> Result<(), Error> {
        let previous = self.ref_swap_dec();
        match previous {
            0 => Ok(()),
            p if p > 0 => Err(Error::StillShared),
            _ => {
                debug!(previous, "closed shared buffer that was already released");
                Err(Error::AlreadyReleased)
            }
        }
    }

    /// Returns a pooled reader over the bytes.
    ///
    /// The reader counts as a holder until it is released or dropped.
    pub fn reader(&self) -> Reader {
        self.ref_inc();
        Reader::new(self.handle())
    }

    /// Copies the bytes into a new, exclusively owned [Buffer].
    pub fn deep_clone(&self) -> Buffer {
        Buffer::from_slice(&self.inner.pool, self)
    }

    /// Returns a pooled cell holding a copy of the bytes.
    pub fn copy(&self) -> Cell {
        self.inner.pool.copy_from(self)
    }

    /// Copies as much of the content as fits into `dst`, returning the count.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let n = self.len().min(dst.len());
        dst[..n].copy_from_slice(&self[..n]);
        n
    }

    /// Writes the whole content to `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self)?;
        Ok(self.len())
    }

    /// Turns the buffer back into an exclusively owned [Buffer].
    ///
    /// Fails (returning the handle) unless this is the only handle and no extra
    /// holders are declared.
    pub fn try_into_mut(self) -> Result<Buffer, Self> {
        if self.ref_value() != 0 {
            return Err(self);
        }
        match Arc::try_unwrap(self.inner) {
            Ok(mut shared) => {
                let cell = mem::take(&mut shared.cell);
                Ok(Buffer::from_parts(cell, shared.pool.clone()))
            }
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl Clone for SharedBuffer {
    /// Returns another handle without declaring a new holder.
    fn clone(&self) -> Self {
        self.handle()
    }
}

impl AsRef<[u8]> for SharedBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.inner.cell.as_ref()
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.inner.cell.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use cellar_macros::test_traced;
    use std::{
        sync::{atomic::AtomicUsize, Barrier},
        thread,
    };

    fn test_pool() -> CapacityPool {
        CapacityPool::new(Config::new(2, 1024))
    }

    #[test]
    fn test_single_holder() {
        let pool = test_pool();
        let shared = Buffer::from_slice(&pool, b"data").share();
        assert_eq!(shared.as_ref(), b"data");
        assert_eq!(shared.ref_value(), 0);
        let ptr = shared.as_ptr();
        assert!(shared.release());

        // Storage is back in the pool
        assert_eq!(pool.make(4).as_ptr(), ptr);
    }

    #[test]
    fn test_declared_holders() {
        let pool = test_pool();
        let a = Buffer::from_slice(&pool, b"data").share();
        a.ref_add(2);
        let b = a.handle();
        let c = a.handle();
        assert_eq!(a.ref_value(), 2);

        assert!(!b.release());
        assert_eq!(a.ref_value(), 1);
        assert!(!a.release());
        assert!(c.release());
    }

    #[test]
    fn test_storage_outlives_early_release() {
        let pool = test_pool();
        let a = Buffer::from_slice(&pool, b"live").share();
        let b = a.handle();
        let ptr = a.as_ptr();

        // The count is exhausted, but `b` still reads the bytes
        assert!(a.release());
        assert_eq!(b.as_ref(), b"live");
        assert_ne!(pool.make(4).as_ptr(), ptr);

        assert!(!b.release());
        assert_eq!(pool.make(4).as_ptr(), ptr);
    }

    #[test]
    fn test_clone_does_not_count() {
        let pool = test_pool();
        let a = Buffer::from_slice(&pool, b"data").share();
        let b = a.clone();
        assert_eq!(a.ref_value(), 0);
        assert_eq!(a.as_ptr(), b.as_ptr());

        // Dropping an undeclared handle leaves the last holder able to tear down
        drop(b);
        assert_eq!(a.ref_value(), 0);
        assert!(a.release());
    }

    #[test]
    fn test_declared_clone_released() {
        let pool = test_pool();
        let a = Buffer::from_slice(&pool, b"data").share();
        a.ref_inc();
        let b = a.clone();
        assert!(!a.release());
        assert!(b.release());
    }

    #[test]
    fn test_ref_operations() {
        let pool = test_pool();
        let shared = Buffer::from_slice(&pool, b"x").share();
        shared.ref_inc();
        shared.ref_inc();
        assert_eq!(shared.ref_value(), 2);
        shared.ref_dec();
        assert_eq!(shared.ref_value(), 1);
        shared.ref_add(5);
        assert_eq!(shared.ref_value(), 6);
        shared.ref_add(-3);
        assert_eq!(shared.ref_value(), 3);
        assert_eq!(shared.ref_swap_dec(), 3);
        assert_eq!(shared.ref_value(), 2);
        shared.ref_store(10);
        assert_eq!(shared.ref_value(), 10);
        shared.ref_reset();
        assert_eq!(shared.ref_value(), 0);
        assert!(shared.release());
    }

    #[test_traced]
    fn test_close() {
        let pool = test_pool();
        let a = Buffer::from_slice(&pool, b"data").share();
        a.ref_add(2);
        let b = a.handle();
        let c = a.handle();
        let d = a.handle();

        // Only the close that tears down succeeds
        let results = [b.close(), c.close(), a.close()];
        assert!(matches!(results[0], Err(Error::StillShared)));
        assert!(matches!(results[1], Err(Error::StillShared)));
        assert!(results[2].is_ok());

        // Already torn down
        assert!(matches!(d.close(), Err(Error::AlreadyReleased)));
    }

    #[test]
    fn test_try_into_mut() {
        let pool = test_pool();
        let a = Buffer::from_slice(&pool, b"data").share();
        let b = a.clone();

        // Declared holder outstanding
        a.ref_inc();
        let a = a.try_into_mut().unwrap_err();
        b.ref_dec();

        // Handle outstanding
        let a = a.try_into_mut().unwrap_err();
        drop(b);

        let mut buf = a.try_into_mut().unwrap();
        buf.append(b"!");
        assert_eq!(buf.as_ref(), b"data!");
    }

    #[test_traced(level = "TRACE")]
    fn test_try_into_mut_drops_empty_shell() {
        let pool = CapacityPool::new(Config::new(2, 1024).with_stats(true));
        let shared = Buffer::with_capacity(&pool, 8).share();
        let ptr = shared.as_ptr();
        let buf = shared.try_into_mut().unwrap();

        // The emptied shell returns nothing, the moved storage returns once
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.as_ptr(), ptr);
        assert!(buf.release());
        let reused = pool.make(8);
        let fresh = pool.make(8);
        assert_eq!(reused.as_ptr(), ptr);
        assert_ne!(fresh.as_ptr(), ptr);
        assert_eq!(pool.reuse_stats(10)[0].reuse_hits, 1);
    }

    #[test]
    fn test_copies() {
        let pool = test_pool();
        let shared = Buffer::from_slice(&pool, b"hello").share();

        let mut deep = shared.deep_clone();
        deep[0] = b'j';
        assert_eq!(shared.as_ref(), b"hello");
        assert_eq!(deep.as_ref(), b"jello");

        let cell = shared.copy();
        assert_eq!(cell.as_ref(), b"hello");
        assert_ne!(cell.as_ptr(), shared.as_ptr());

        let mut dst = [0u8; 2];
        assert_eq!(shared.copy_to(&mut dst), 2);
        assert_eq!(&dst, b"he");

        let mut out = Vec::new();
        assert_eq!(shared.write_to(&mut out).unwrap(), 5);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_concurrent_release_exactly_once() {
        const HOLDERS: usize = 16;
        const ROUNDS: usize = 200;

        let pool = test_pool();
        for _ in 0..ROUNDS {
            let shared = Buffer::from_slice(&pool, b"concurrent").share();
            shared.ref_add(HOLDERS as i64 - 1);

            let wins = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(HOLDERS));
            let handles: Vec<_> = (0..HOLDERS)
                .map(|_| {
                    let holder = shared.handle();
                    let wins = wins.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        assert_eq!(holder.as_ref(), b"concurrent");
                        barrier.wait();
                        if holder.release() {
                            wins.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                })
                .collect();
            drop(shared);
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(wins.load(Ordering::Relaxed), 1);
        }
    }
}
