//! Fixed-size buffers for streaming copy loops.
//!
//! Proxies and other stream forwarders want a scratch buffer of one size per
//! copy, handed back when the copy finishes. [FixedPool] serves exactly that from
//! a single-class [CapacityPool].

use crate::{CapacityPool, Cell, Config};
use std::io::{self, Read, Write};

/// A source of scratch buffers that are given back after use.
pub trait BufferSource {
    /// Returns a buffer whose whole length may be written.
    fn acquire(&self) -> Cell;

    /// Gives a buffer obtained from [BufferSource::acquire] back.
    fn recycle(&self, cell: Cell);
}

/// Hands out buffers of one fixed size.
///
/// Sizes that are not a power of two are served from the next power of two, and
/// such buffers are not recycled (their capacity exceeds the pool's bounds).
#[derive(Clone, Debug)]
pub struct FixedPool {
    pool: CapacityPool,
}

impl FixedPool {
    /// Creates a pool of `size`-byte buffers.
    pub fn new(size: usize) -> Self {
        Self {
            pool: CapacityPool::new(Config::fixed(size)),
        }
    }

    /// Returns the length of the buffers handed out.
    pub fn size(&self) -> usize {
        self.pool.min_size()
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &CapacityPool {
        &self.pool
    }
}

impl BufferSource for FixedPool {
    fn acquire(&self) -> Cell {
        self.pool.alloc_min()
    }

    fn recycle(&self, cell: Cell) {
        self.pool.release(cell);
    }
}

/// Copies `reader` to `writer` through a buffer from `source`, returning the
/// number of bytes copied.
///
/// Reads interrupted by a signal are retried. The buffer is given back to `source`
/// whether or not the copy succeeds.
pub fn copy<S, R, W>(source: &S, reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    S: BufferSource + ?Sized,
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut cell = source.acquire();
    let result = copy_through(&mut cell, reader, writer);
    source.recycle(cell);
    result
}

fn copy_through<R, W>(buf: &mut [u8], reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut copied = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buf[..n])?;
        copied += n as u64;
    }
}
