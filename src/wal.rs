//! The write-ahead log seam.
//!
//! The buffer pool carries a [`LogManager`] so that write-ahead logging can
//! be threaded through later; today the core only draws log sequence
//! numbers from it when new on-page structures are stamped.

use std::sync::atomic::{AtomicI32, Ordering};

/// No LSN has been made durable yet.
pub const INVALID_LSN: i32 = -1;

/// Owner of the log sequence number counters: the monotone allocator and
/// the durable watermark.
pub struct LogManager {
    next_lsn: AtomicI32,
    flushed_lsn: AtomicI32,
}

impl LogManager {
    /// Create a log manager with the allocator at zero and nothing
    /// flushed.
    pub fn new() -> Self {
        LogManager {
            next_lsn: AtomicI32::new(0),
            flushed_lsn: AtomicI32::new(INVALID_LSN),
        }
    }

    /// Take the next log sequence number.
    pub fn next_lsn(&self) -> i32 {
        self.next_lsn.fetch_add(1, Ordering::Relaxed)
    }

    /// The highest LSN known to be durable, or [`INVALID_LSN`] if no log
    /// record has reached stable storage.
    pub fn flushed_lsn(&self) -> i32 {
        self.flushed_lsn.load(Ordering::Relaxed)
    }

    /// Advance the durable watermark to `lsn`. The watermark never moves
    /// backwards.
    pub fn mark_flushed(&self, lsn: i32) {
        self.flushed_lsn.fetch_max(lsn, Ordering::Relaxed);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
