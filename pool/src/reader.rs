//! Pooled read cursors over [SharedBuffer]s.
//!
//! Every [CapacityPool](crate::CapacityPool) keeps a small free list of cursor
//! shells so handing out a reader does not allocate in steady state.

use crate::SharedBuffer;
use crossbeam_queue::ArrayQueue;
use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom};

/// Number of idle cursors a pool retains.
const MAX_IDLE_CURSORS: usize = 256;

/// The bytes a cursor reads: a shared buffer while in use, nothing while idle.
struct Slot(Option<SharedBuffer>);

impl AsRef<[u8]> for Slot {
    fn as_ref(&self) -> &[u8] {
        match &self.0 {
            Some(buffer) => buffer.as_ref(),
            None => &[],
        }
    }
}

/// Free list of idle cursors.
pub(crate) struct ReaderPool {
    idle: ArrayQueue<Box<Cursor<Slot>>>,
}

impl Default for ReaderPool {
    fn default() -> Self {
        Self {
            idle: ArrayQueue::new(MAX_IDLE_CURSORS),
        }
    }
}

impl ReaderPool {
    /// Returns a cursor positioned at the start of `buffer`.
    fn take(&self, buffer: SharedBuffer) -> Box<Cursor<Slot>> {
        match self.idle.pop() {
            Some(mut cursor) => {
                cursor.get_mut().0 = Some(buffer);
                cursor.set_position(0);
                cursor
            }
            None => Box::new(Cursor::new(Slot(Some(buffer)))),
        }
    }

    /// Detaches `cursor` from its buffer and keeps it for reuse.
    fn put(&self, mut cursor: Box<Cursor<Slot>>) -> Option<SharedBuffer> {
        let buffer = cursor.get_mut().0.take();
        cursor.set_position(0);
        let _ = self.idle.push(cursor);
        buffer
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.idle.len()
    }
}

/// A reader over the bytes of a [SharedBuffer].
///
/// Holds one declared reference to the buffer. [Reader::release] (or dropping the
/// reader) recycles the cursor and releases that reference.
pub struct Reader {
    cursor: Option<Box<Cursor<Slot>>>,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("position", &self.position())
            .field("len", &self.get_ref().len())
            .finish()
    }
}

impl Reader {
    /// Binds a pooled cursor to `buffer`, which must already count this reader
    /// as a holder.
    pub(crate) fn new(buffer: SharedBuffer) -> Self {
        let pool = buffer.pool().clone();
        let cursor = pool.readers().take(buffer);
        Self {
            cursor: Some(cursor),
        }
    }

    /// Returns the bytes being read.
    pub fn get_ref(&self) -> &[u8] {
        match &self.cursor {
            Some(cursor) => cursor.get_ref().as_ref(),
            None => &[],
        }
    }

    /// Returns the current read position.
    pub fn position(&self) -> u64 {
        self.cursor.as_ref().map_or(0, |cursor| cursor.position())
    }

    /// Returns the number of bytes left to read.
    pub fn remaining(&self) -> usize {
        let position = usize::try_from(self.position()).unwrap_or(usize::MAX);
        self.get_ref().len().saturating_sub(position)
    }

    /// Recycles the cursor and releases the reader's reference to the buffer.
    ///
    /// Returns the result of [SharedBuffer::release].
    pub fn release(mut self) -> bool {
        self.finish()
    }

    fn finish(&mut self) -> bool {
        let Some(cursor) = self.cursor.take() else {
            return false;
        };
        let pool = match &cursor.get_ref().0 {
            Some(buffer) => buffer.pool().clone(),
            None => return false,
        };
        match pool.readers().put(cursor) {
            Some(buffer) => buffer.release(),
            None => false,
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.finish();
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.cursor {
            Some(cursor) => cursor.read(buf),
            None => Ok(0),
        }
    }
}

impl BufRead for Reader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match &mut self.cursor {
            Some(cursor) => cursor.fill_buf(),
            None => Ok(&[]),
        }
    }

    fn consume(&mut self, amt: usize) {
        if let Some(cursor) = &mut self.cursor {
            cursor.consume(amt);
        }
    }
}

impl Seek for Reader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.cursor {
            Some(cursor) => cursor.seek(pos),
            None => Ok(0),
        }
    }
}
