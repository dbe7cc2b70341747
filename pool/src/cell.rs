//! Owned handle over one contiguous byte region.

use bytes::{buf::UninitSlice, BufMut};
use std::ops::{Deref, DerefMut};

/// A contiguous byte region of fixed capacity, currently holding `len` bytes.
///
/// Cells are handed out by a [crate::CapacityPool] and given back with
/// [crate::CapacityPool::release]. A cell whose capacity is not exactly one of the
/// pool's size classes (for example one built from a [Vec]) is never recycled.
///
/// # Layout
///
/// ```text
/// [0.................len.................capacity]
///  ^                  ^                   ^
///  |                  |                   |
///  region start       write position      region end
///
/// - [0..len]:        logical content (as_ref returns this slice)
/// - [len..capacity]: stale bytes from previous users, writable via BufMut
/// ```
///
/// The whole region is always initialized: fresh regions are zeroed and recycled
/// regions keep whatever their last holder wrote. Bytes past `len` must be treated
/// as garbage.
///
/// # Fixed Capacity
///
/// Like the pooled buffers it is modeled after, a cell does NOT grow. Writing past
/// its capacity panics (per the `BufMut` trait contract). Use
/// [crate::CapacityPool::append] or [crate::Buffer] for growable content.
#[derive(Default)]
pub struct Cell {
    data: Box<[u8]>,
    len: usize,
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Cell {
    /// Wraps a region, exposing the first `len` bytes.
    pub(crate) fn from_region(data: Box<[u8]>, len: usize) -> Self {
        debug_assert!(len <= data.len());
        Self { data, len }
    }

    /// Allocates a zeroed region of `capacity` bytes.
    pub(crate) fn zeroed(capacity: usize, len: usize) -> Self {
        Self::from_region(vec![0u8; capacity].into_boxed_slice(), len)
    }

    /// Gives up the underlying region.
    pub(crate) fn into_region(self) -> Box<[u8]> {
        self.data
    }

    /// Returns the number of bytes in the cell.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the cell holds no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of bytes the cell can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of bytes that can still be written.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// Returns a pointer to the start of the region.
    ///
    /// The address identifies the region across release and reuse.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Sets the length of the cell, exposing (possibly stale) bytes up to `len`.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity.
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity(), "length exceeds cell capacity");
        self.len = len;
    }

    /// Shortens the cell to `len` bytes. Has no effect if `len >= self.len()`.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// Clears the cell. Capacity (and the stale bytes) are preserved.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Returns the writable region past the current length.
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Appends `src` to the cell.
    ///
    /// # Panics
    ///
    /// Panics if `src` does not fit in the remaining capacity.
    pub fn extend_from_slice(&mut self, src: &[u8]) {
        assert!(
            src.len() <= self.remaining(),
            "cannot write past end of cell"
        );
        let end = self.len + src.len();
        self.data[self.len..end].copy_from_slice(src);
        self.len = end;
    }

    /// Converts the cell into a vector holding its content.
    ///
    /// The vector keeps the cell's capacity.
    pub fn into_vec(self) -> Vec<u8> {
        let mut v = self.data.into_vec();
        v.truncate(self.len);
        v
    }
}

impl From<Vec<u8>> for Cell {
    /// Adopts a vector as a (foreign) cell, keeping its full capacity.
    fn from(mut v: Vec<u8>) -> Self {
        let len = v.len();
        v.resize(v.capacity(), 0);
        Self::from_region(v.into_boxed_slice(), len)
    }
}

impl AsRef<[u8]> for Cell {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl AsMut<[u8]> for Cell {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}

impl Deref for Cell {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

impl DerefMut for Cell {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut()
    }
}

// SAFETY: BufMut implementation for Cell.
// - `remaining_mut()` reports bytes available for writing (capacity - len)
// - `chunk_mut()` returns the initialized spare region from len to capacity
// - `advance_mut()` advances len within bounds
unsafe impl BufMut for Cell {
    #[inline]
    fn remaining_mut(&self) -> usize {
        self.remaining()
    }

    #[inline]
    unsafe fn advance_mut(&mut self, cnt: usize) {
        assert!(cnt <= self.remaining(), "cannot advance past end of cell");
        self.len += cnt;
    }

    #[inline]
    fn chunk_mut(&mut self) -> &mut UninitSlice {
        UninitSlice::new(self.spare_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed() {
        let cell = Cell::zeroed(16, 4);
        assert_eq!(cell.len(), 4);
        assert_eq!(cell.capacity(), 16);
        assert_eq!(cell.remaining(), 12);
        assert_eq!(cell.as_ref(), &[0u8; 4]);
    }

    #[test]
    fn test_extend_and_truncate() {
        let mut cell = Cell::zeroed(8, 0);
        cell.extend_from_slice(b"abc");
        cell.extend_from_slice(b"de");
        assert_eq!(cell.as_ref(), b"abcde");

        // Truncating past the length is a no-op
        cell.truncate(10);
        assert_eq!(cell.len(), 5);
        cell.truncate(2);
        assert_eq!(cell.as_ref(), b"ab");

        // Stale bytes are still there
        cell.set_len(5);
        assert_eq!(cell.as_ref(), b"abcde");
        cell.clear();
        assert!(cell.is_empty());
        assert_eq!(cell.capacity(), 8);
    }

    #[test]
    #[should_panic(expected = "cannot write past end of cell")]
    fn test_extend_overflow() {
        let mut cell = Cell::zeroed(4, 2);
        cell.extend_from_slice(b"abc");
    }

    #[test]
    #[should_panic(expected = "length exceeds cell capacity")]
    fn test_set_len_overflow() {
        let mut cell = Cell::zeroed(4, 0);
        cell.set_len(5);
    }

    #[test]
    fn test_buf_mut() {
        let mut cell = Cell::zeroed(8, 0);
        cell.put_u8(1);
        cell.put_u16(0x0203);
        cell.put_slice(&[4, 5]);
        assert_eq!(cell.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(cell.remaining_mut(), 3);
    }

    #[test]
    #[should_panic]
    fn test_buf_mut_overflow() {
        let mut cell = Cell::zeroed(2, 0);
        cell.put_slice(&[1, 2, 3]);
    }

    #[test]
    fn test_from_vec() {
        let mut v = Vec::with_capacity(10);
        v.extend_from_slice(b"xyz");
        let cell = Cell::from(v);
        assert_eq!(cell.len(), 3);
        assert_eq!(cell.capacity(), 10);
        assert_eq!(cell.as_ref(), b"xyz");

        let v = cell.into_vec();
        assert_eq!(v, b"xyz");
        assert_eq!(v.capacity(), 10);
    }

    #[test]
    fn test_default_is_empty() {
        let cell = Cell::default();
        assert_eq!(cell.len(), 0);
        assert_eq!(cell.capacity(), 0);
    }
}
