//! Recycle byte storage through power-of-two size classes.
//!
//! A [CapacityPool] partitions the range `[min_size, max_size]` into power-of-two size
//! classes and keeps a bounded, lock-free free list per class. Storage is handed out as
//! [Cell]s and recycled by [CapacityPool::release], which only accepts cells whose
//! capacity is exactly a class capacity. Requests larger than `max_size` bypass the
//! pool entirely.
//!
//! On top of the pool, [Buffer] is a growable byte container that moves between cells
//! as it grows (releasing the old one each time), and [SharedBuffer] is its frozen,
//! reference-counted form: a producer declares how many holders it hands the buffer
//! to, and exactly one of their releases returns the storage to the pool.
//!
//! # Example
//!
//! ```rust
//! use cellar_pool::{Buffer, CapacityPool, Config};
//!
//! let pool = CapacityPool::new(Config::new(64, 64 * 1024));
//!
//! // Raw cells
//! let cell = pool.make(100);
//! assert_eq!(cell.capacity(), 128);
//! assert!(pool.release(cell));
//!
//! // Growable buffers
//! let mut buf = Buffer::with_capacity(&pool, 16);
//! buf.append(b"hello ");
//! buf.append("world");
//! assert_eq!(buf.as_ref(), b"hello world");
//!
//! // Shared buffers
//! let shared = buf.share();
//! shared.ref_add(1);
//! let other = shared.handle();
//! let released = [shared.release(), other.release()];
//! assert_eq!(released.iter().filter(|r| **r).count(), 1);
//! ```
//!
//! # Status
//!
//! `cellar-pool` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use thiserror::Error;

pub mod buffer;
pub use buffer::{Buffer, SharedBuffer, DEFAULT_BUFFER_SIZE};
mod cell;
pub use cell::Cell;
pub mod fixed;
pub use fixed::{BufferSource, FixedPool};
pub mod pool;
pub use pool::{CapacityPool, Config, PoolStat, RuntimeSummary};
pub mod reader;
pub use reader::Reader;

/// Largest length a [Buffer] may reach.
pub const MAX_LEN: usize = i32::MAX as usize;

/// Errors that can occur when interacting with buffers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("buffer too large")]
    TooLarge,
    #[error("buffer already released")]
    AlreadyReleased,
    #[error("buffer still has other holders")]
    StillShared,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
