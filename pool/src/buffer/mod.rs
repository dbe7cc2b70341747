//! Growable byte buffers backed by a [CapacityPool].
//!
//! A [Buffer] owns one pooled [Cell]. Whenever it runs out of room it moves its
//! content into a larger cell from the same pool and releases the old one, so a
//! buffer that grows and shrinks over its life keeps recycling storage instead of
//! allocating. Dropping (or [Buffer::release]-ing) a buffer returns its storage.
//!
//! A buffer that must be read by several holders is frozen with [Buffer::share]
//! into a [SharedBuffer], whose storage is returned exactly once (see
//! [SharedBuffer::release]).

use crate::{CapacityPool, Cell, Error, MAX_LEN};
use bytes::{buf::UninitSlice, BufMut};
use std::{
    io::{self, Read, Write},
    mem,
    ops::{Deref, DerefMut},
};
use tracing::warn;

mod shared;
pub use shared::SharedBuffer;

/// Capacity of a buffer obtained with [Buffer::get].
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Minimum number of bytes reserved when a [BufMut] writer runs out of room.
const BUF_MUT_RESERVE: usize = 64;

/// Returns how much a [BufMut] writer reserves at `len`, never past [MAX_LEN].
const fn buf_mut_reserve(len: usize) -> usize {
    let room = MAX_LEN - len;
    if room < BUF_MUT_RESERVE {
        room
    } else {
        BUF_MUT_RESERVE
    }
}

/// An exclusively owned, growable byte buffer whose storage comes from a
/// [CapacityPool].
pub struct Buffer {
    cell: Cell,
    pool: CapacityPool,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Buffer {
    pub(crate) const fn from_parts(cell: Cell, pool: CapacityPool) -> Self {
        Self { cell, pool }
    }

    /// Returns an empty buffer with capacity for [DEFAULT_BUFFER_SIZE] bytes.
    pub fn get(pool: &CapacityPool) -> Self {
        Self::with_capacity(pool, DEFAULT_BUFFER_SIZE)
    }

    /// Returns an empty buffer with capacity for at least `capacity` bytes.
    pub fn with_capacity(pool: &CapacityPool, capacity: usize) -> Self {
        Self::from_parts(pool.make(capacity), pool.clone())
    }

    /// Returns a buffer of length `len`.
    ///
    /// The content is whatever the previous holder of the storage left there.
    pub fn with_len(pool: &CapacityPool, len: usize) -> Self {
        Self::from_parts(pool.alloc(len), pool.clone())
    }

    /// Returns a buffer holding a copy of `data`.
    pub fn from_slice(pool: &CapacityPool, data: impl AsRef<[u8]>) -> Self {
        Self::from_parts(pool.copy_from(data), pool.clone())
    }

    /// Adopts `v` as the buffer's storage.
    ///
    /// The storage is only recycled on release if its capacity happens to match a
    /// size class of `pool`.
    pub fn from_vec(pool: &CapacityPool, v: Vec<u8>) -> Self {
        Self::from_parts(Cell::from(v), pool.clone())
    }

    /// Returns the number of bytes in the buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.cell.len()
    }

    /// Returns true if the buffer holds no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.cell.is_empty()
    }

    /// Returns the number of bytes the buffer can hold without moving.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cell.capacity()
    }

    /// Returns the pool the buffer's storage comes from.
    pub const fn pool(&self) -> &CapacityPool {
        &self.pool
    }

    /// Extends the length by `n` bytes, reserving room first.
    ///
    /// The new bytes are stale.
    ///
    /// # Panics
    ///
    /// Panics if the new length would exceed [MAX_LEN].
    pub fn grow(&mut self, n: usize) {
        self.reserve(n);
        let len = self.len() + n;
        self.cell.set_len(len);
    }

    /// Ensures at least `n` more bytes can be written without moving.
    ///
    /// If the current storage is too small, the content moves to a pooled cell
    /// sized for exactly `len + n` bytes (rounded up to its class) and the old
    /// storage is released.
    ///
    /// # Panics
    ///
    /// Panics if `len + n` exceeds [MAX_LEN].
    pub fn reserve(&mut self, n: usize) {
        if n <= self.cell.remaining() {
            return;
        }
        let total = self.len().saturating_add(n);
        assert!(total <= MAX_LEN, "buffer too large");
        self.relocate(total);
    }

    /// Keeps the first `len` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `len` is greater than the current length.
    pub fn truncate(&mut self, len: usize) {
        assert!(len <= self.len(), "truncation out of range");
        self.cell.truncate(len);
    }

    /// Clears the buffer, keeping its storage.
    pub fn reset(&mut self) {
        self.cell.clear();
    }

    /// Appends `data`, moving to larger storage if needed.
    pub fn append(&mut self, data: impl AsRef<[u8]>) {
        let cell = mem::take(&mut self.cell);
        self.cell = self.pool.append(cell, data);
    }

    /// Appends a single byte.
    pub fn push(&mut self, byte: u8) {
        self.append([byte]);
    }

    /// Replaces the content with `data`.
    pub fn set(&mut self, data: impl AsRef<[u8]>) {
        self.cell.clear();
        self.append(data);
    }

    /// Appends everything `reader` yields until end of stream, returning the
    /// number of bytes appended.
    ///
    /// Storage doubles (through the pool) whenever it fills up. On a stream error,
    /// the bytes read so far are kept and the error is returned. Reads interrupted
    /// by a signal are retried.
    ///
    /// Returns [Error::TooLarge] once the buffer reaches [MAX_LEN].
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<usize, Error> {
        self.fill(reader, MAX_LEN)
    }

    fn fill<R: Read>(&mut self, reader: &mut R, ceiling: usize) -> Result<usize, Error> {
        let start = self.len();
        loop {
            let len = self.len();
            let mut spare = self.cell.remaining().min(ceiling.saturating_sub(len));
            if spare == 0 {
                if len >= ceiling {
                    warn!(len, "buffer reached maximum length");
                    return Err(Error::TooLarge);
                }
                let capacity = len.saturating_mul(2).max(self.pool.min_size()).min(ceiling);
                self.relocate(capacity);
                spare = self.cell.remaining().min(ceiling - len);
            }

            match reader.read(&mut self.cell.spare_mut()[..spare]) {
                Ok(0) => return Ok(len - start),
                Ok(n) => self.cell.set_len(len + n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Writes the whole content to `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self)?;
        Ok(self.len())
    }

    /// Returns a pooled cell holding a copy of the content.
    pub fn copy(&self) -> Cell {
        self.pool.copy_from(self)
    }

    /// Copies as much of the content as fits into `dst`, returning the count.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let n = self.len().min(dst.len());
        dst[..n].copy_from_slice(&self[..n]);
        n
    }

    /// Returns the storage to the pool, reporting whether it was recycled.
    pub fn release(mut self) -> bool {
        let cell = mem::take(&mut self.cell);
        self.pool.release(cell)
    }

    /// Freezes the buffer into a [SharedBuffer] with a single holder.
    pub fn share(mut self) -> SharedBuffer {
        let cell = mem::take(&mut self.cell);
        SharedBuffer::new(cell, self.pool.clone())
    }

    /// Moves the content into a pooled cell that can hold `capacity` bytes.
    fn relocate(&mut self, capacity: usize) {
        let mut grown = self.pool.make(capacity);
        grown.extend_from_slice(&self.cell);
        let old = mem::replace(&mut self.cell, grown);
        self.pool.release(old);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.cell.capacity() > 0 {
            let cell = mem::take(&mut self.cell);
            self.pool.release(cell);
        }
    }
}

impl Clone for Buffer {
    /// Copies the content into fresh pooled storage.
    fn clone(&self) -> Self {
        Self::from_slice(&self.pool, self)
    }
}

impl AsRef<[u8]> for Buffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.cell.as_ref()
    }
}

impl AsMut<[u8]> for Buffer {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.cell.as_mut()
    }
}

impl Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.cell.as_ref()
    }
}

impl DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        self.cell.as_mut()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// SAFETY: BufMut implementation for Buffer.
// - `remaining_mut()` reports how far the buffer may still grow (MAX_LEN - len)
// - `chunk_mut()` reserves room when the storage is full, so it is never empty
// - `advance_mut()` is bounds-checked by the underlying cell
unsafe impl BufMut for Buffer {
    #[inline]
    fn remaining_mut(&self) -> usize {
        MAX_LEN - self.len()
    }

    #[inline]
    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.cell.advance_mut(cnt);
    }

    #[inline]
    fn chunk_mut(&mut self) -> &mut UninitSlice {
        if self.cell.remaining() == 0 {
            self.reserve(buf_mut_reserve(self.len()));
        }
        self.cell.chunk_mut()
    }
}
