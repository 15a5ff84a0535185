//! Allocation of channel and listener identifiers.
//!
//! Identifiers only need to be unique within one dispatcher, so a simple
//! counter is enough.  The counter uses `AtomicU32` so an allocator can be
//! shared behind an `Arc` without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonically increasing identifier source.
///
/// Identifiers start at 1; 0 is never handed out so it can be used as a
/// "no channel" marker on the wire.
///
/// # Examples
///
/// ```rust
/// use console_core::mux::IdAllocator;
///
/// let ids = IdAllocator::new();
/// assert_eq!(ids.next(), 1);
/// assert_eq!(ids.next(), 2);
/// ```
#[derive(Debug)]
pub struct IdAllocator {
    inner: AtomicU32,
}

impl IdAllocator {
    /// Creates an allocator whose first identifier is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(1),
        }
    }

    /// Returns the next identifier.  Wraps from `u32::MAX` back to 1.
    pub fn next(&self) -> u32 {
        let id = self.inner.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            // Wrapped; skip the reserved value.
            return self.inner.fetch_add(1, Ordering::Relaxed);
        }
        id
    }

    /// The identifier the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
