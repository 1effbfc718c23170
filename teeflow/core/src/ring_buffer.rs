//! Fixed-Capacity Byte Ring Buffer
//!
//! A circular byte store shared between one tee's writers and readers.
//!
//! # Layout
//!
//! ```text
//!   0                 anchor            anchor+length        capacity
//!   ├──────────────────┼══════════════════════┼──────────────────┤
//!   │       free       │     valid data       │       free       │
//!   └──────────────────┴──────────────────────┴──────────────────┘
//!
//!   wrapped:
//!   ├══════════┼───────────────────────────────┼═════════════════┤
//!   │ data (2) │             free              │    data (1)     │
//!               ^ (anchor+length) mod C         ^ anchor
//! ```
//!
//! Every copy touches at most two segments. State mutation happens under a
//! single `parking_lot::Mutex` that is held for one copy and never across an
//! `.await`; the lock gives mutual exclusion only, not fairness.

use parking_lot::Mutex;

use crate::error::{ConfigurationError, TeeError};

/// Default ring buffer capacity (128 KiB)
pub const DEFAULT_RING_CAPACITY: usize = 128 * 1024;

/// Mutable ring state, only ever touched with the lock held
#[derive(Debug)]
struct RingState {
    storage: Box<[u8]>,
    /// Index of the first valid byte (0 whenever `length == 0`)
    anchor: usize,
    /// Number of valid bytes
    length: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn available(&self) -> usize {
        self.capacity() - self.length
    }

    /// Copy `src` behind the valid data. Caller guarantees it fits.
    fn push(&mut self, src: &[u8]) {
        let capacity = self.capacity();
        let tail = (self.anchor + self.length) % capacity;
        let first = src.len().min(capacity - tail);

        self.storage[tail..tail + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        if rest > 0 {
            self.storage[..rest].copy_from_slice(&src[first..]);
        }
        self.length += src.len();
    }

    /// Move up to `dest.len()` bytes out of the front of the buffer
    fn pop(&mut self, dest: &mut [u8]) -> usize {
        let count = self.length.min(dest.len());
        if count == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = count.min(capacity - self.anchor);
        dest[..first].copy_from_slice(&self.storage[self.anchor..self.anchor + first]);
        let rest = count - first;
        if rest > 0 {
            dest[first..count].copy_from_slice(&self.storage[..rest]);
        }

        self.length -= count;
        self.anchor = if self.length == 0 {
            0
        } else {
            (self.anchor + count) % capacity
        };
        count
    }
}

/// Fixed-capacity circular byte buffer with mutually exclusive access
///
/// Reads and writes may be issued from any number of tasks; each call is
/// atomic with respect to the others. The size accessors are point-in-time
/// snapshots.
#[derive(Debug)]
pub struct RingBuffer {
    state: Mutex<RingState>,
}

impl RingBuffer {
    /// Create a ring buffer holding exactly `capacity` bytes
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ZeroCapacity`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, TeeError> {
        if capacity == 0 {
            return Err(ConfigurationError::ZeroCapacity.into());
        }
        Ok(Self {
            state: Mutex::new(RingState {
                storage: vec![0u8; capacity].into_boxed_slice(),
                anchor: 0,
                length: 0,
            }),
        })
    }

    /// Total capacity in bytes (0 once released)
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Number of buffered bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().length
    }

    /// Check whether no bytes are buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free space in bytes
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().available()
    }

    /// Index of the oldest buffered byte
    #[must_use]
    pub fn anchor(&self) -> usize {
        self.state.lock().anchor
    }

    /// Copy `min(len, dest.len())` bytes out of the buffer
    ///
    /// Returns the number of bytes copied; 0 when the buffer is empty.
    pub fn read(&self, dest: &mut [u8]) -> usize {
        self.state.lock().pop(dest)
    }

    /// Append all of `src`, or nothing
    ///
    /// # Errors
    ///
    /// Returns [`TeeError::Overflow`] if `src` is larger than the free space.
    /// The buffer is unchanged in that case.
    pub fn write(&self, src: &[u8]) -> Result<(), TeeError> {
        let mut state = self.state.lock();
        let available = state.available();
        if src.len() > available {
            return Err(TeeError::Overflow {
                requested: src.len(),
                available,
            });
        }
        if !src.is_empty() {
            state.push(src);
        }
        Ok(())
    }

    /// Append the largest prefix of `src` that currently fits
    ///
    /// The space check and the copy happen under one lock acquisition.
    /// Returns the number of bytes written, which is 0 when the buffer is full.
    pub fn write_some(&self, src: &[u8]) -> usize {
        let mut state = self.state.lock();
        let count = src.len().min(state.available());
        if count > 0 {
            state.push(&src[..count]);
        }
        count
    }

    /// Drop the backing storage
    ///
    /// Buffered bytes are discarded. Afterwards the capacity is 0, reads
    /// return 0 and non-empty writes overflow.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.storage = Box::default();
        state.anchor = 0;
        state.length = 0;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self {
            state: Mutex::new(RingState {
                storage: vec![0u8; DEFAULT_RING_CAPACITY].into_boxed_slice(),
                anchor: 0,
                length: 0,
            }),
        }
    }
}
