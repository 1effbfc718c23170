//! Error Types
//!
//! Every fallible engine operation returns [`TeeError`]. Construction problems
//! carry a [`ConfigurationError`] so callers can match on the exact cause, and
//! fan-out failures keep one [`SinkFailure`] per failed sink.

use std::fmt;
use std::io;

use thiserror::Error;

/// Minimum buffer size accepted by [`crate::TeeStream`]
pub const MIN_BUFFER_SIZE: usize = 1024;

// =============================================================================
// Construction Errors
// =============================================================================

/// Reasons a tee, ring buffer or pump refuses to be constructed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The sink list was empty
    #[error("at least one sink is required")]
    NoSinks,

    /// Buffer size below the accepted minimum
    #[error("buffer size {size} is below the minimum of {min} bytes")]
    BufferTooSmall {
        /// Requested size
        size: usize,
        /// Minimum accepted size
        min: usize,
    },

    /// A sink in the list does not accept writes
    #[error("sink at index {index} ({name}) is not writable")]
    SinkNotWritable {
        /// Position in the sink list
        index: usize,
        /// Sink name, for diagnostics
        name: String,
    },

    /// More than one self-buffer marker in the sink list
    #[error("sink list contains more than one self-buffer marker (indices {first} and {duplicate})")]
    MultipleSelfBuffers {
        /// Index of the first marker
        first: usize,
        /// Index of the rejected marker
        duplicate: usize,
    },

    /// Ring buffer capacity of zero
    #[error("ring buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// Pump staging size too small to split into two halves
    #[error("pump buffer size {size} is too small (minimum {min})")]
    PumpBufferTooSmall {
        /// Requested size
        size: usize,
        /// Minimum accepted size
        min: usize,
    },

    /// Flush threshold outside 1..=100
    #[error("flush threshold {percent}% is outside 1..=100")]
    InvalidFlushThreshold {
        /// Requested percentage
        percent: u8,
    },
}

// =============================================================================
// Sink Failures
// =============================================================================

/// One failed sink operation inside a fan-out
#[derive(Debug)]
pub struct SinkFailure {
    /// Position of the sink in the list the tee was built from
    pub index: usize,
    /// Sink name, for diagnostics
    pub sink: String,
    /// The underlying I/O error
    pub source: io::Error,
}

impl fmt::Display for SinkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink {} ({}): {}", self.index, self.sink, self.source)
    }
}

impl std::error::Error for SinkFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn join_failures(failures: &[SinkFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_errors(errors: &[TeeError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// TeeError
// =============================================================================

/// Errors produced by the ring buffer, the tee stream and the copy pump
#[derive(Debug, Error)]
pub enum TeeError {
    /// Invalid construction parameters
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Ring buffer write larger than the free space
    #[error("ring buffer overflow: {requested} bytes requested, {available} available")]
    Overflow {
        /// Bytes the caller tried to write
        requested: usize,
        /// Free space at the time of the call
        available: usize,
    },

    /// The operation is intentionally not provided
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// One or more external sinks failed
    #[error("{} sink(s) failed: {}", .0.len(), join_failures(.0))]
    Sinks(Vec<SinkFailure>),

    /// The pump's source failed to read
    #[error("source read failed: {0}")]
    Source(#[source] io::Error),

    /// Write after the tee was closed
    #[error("tee stream is closed")]
    Closed,

    /// Several distinct failures from concurrent work
    #[error("{} concurrent failures: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<TeeError>),
}

impl TeeError {
    /// Check whether this error represents cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Aggregate(errors) => errors.iter().all(Self::is_cancelled),
            _ => false,
        }
    }

    /// Combine failures from concurrently awaited work into one error
    ///
    /// Returns `None` for an empty list. When every failure is a
    /// cancellation the result is [`TeeError::Cancelled`]; a single failure is
    /// returned unchanged.
    #[must_use]
    pub fn aggregate(mut errors: Vec<TeeError>) -> Option<TeeError> {
        if errors.is_empty() {
            return None;
        }
        if errors.iter().all(Self::is_cancelled) {
            return Some(Self::Cancelled);
        }
        errors.retain(|e| !e.is_cancelled());
        if errors.len() == 1 {
            return errors.pop();
        }
        Some(Self::Aggregate(errors))
    }
}
