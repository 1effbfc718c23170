//! Copy Pump
//!
//! Drains a [`ByteSource`] into a [`TeeStream`], overlapping each source read
//! with the tee write of the previous chunk.
//!
//! ```text
//!            staging (buffer_size)
//!   ┌──────────────────┬──────────────────┐
//!   │     filling      │     draining     │
//!   └────────▲─────────┴────────┬─────────┘
//!            │                  │
//!      source.read()       tee.write()      (awaited together)
//!
//!   filling past the threshold  ->  swap halves
//!   source returns 0            ->  write leftovers, set_at_end
//! ```

use std::io;

use tokio_util::sync::CancellationToken;

use crate::config::PumpConfig;
use crate::error::{ConfigurationError, TeeError};
use crate::source::ByteSource;
use crate::tee::TeeStream;

/// Default share of a staging half that must fill before it is forwarded
pub const DEFAULT_FLUSH_THRESHOLD_PERCENT: u8 = 90;

/// Smallest staging size that still splits into two non-empty halves
pub const MIN_PUMP_BUFFER_SIZE: usize = 2;

/// Outcome of a completed pump run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Bytes forwarded to the tee
    pub bytes_copied: u64,
    /// Source reads issued, including the final one returning 0
    pub reads: u64,
    /// Tee writes issued
    pub writes: u64,
}

/// One staging half
struct Staging {
    buf: Box<[u8]>,
    filled: usize,
}

impl Staging {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size].into_boxed_slice(),
            filled: 0,
        }
    }

    fn data(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    fn is_empty(&self) -> bool {
        self.filled == 0
    }

    fn is_full(&self) -> bool {
        self.filled == self.buf.len()
    }

    fn clear(&mut self) {
        self.filled = 0;
    }
}

/// Double-buffered copier from a source into a tee
#[derive(Clone, Debug)]
pub struct CopyPump {
    buffer_size: usize,
    flush_threshold_percent: u8,
}

impl CopyPump {
    /// Create a pump whose staging area is `buffer_size` bytes, split in half
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::PumpBufferTooSmall`] below 2 bytes.
    pub fn new(buffer_size: usize) -> Result<Self, TeeError> {
        if buffer_size < MIN_PUMP_BUFFER_SIZE {
            return Err(ConfigurationError::PumpBufferTooSmall {
                size: buffer_size,
                min: MIN_PUMP_BUFFER_SIZE,
            }
            .into());
        }
        Ok(Self {
            buffer_size,
            flush_threshold_percent: DEFAULT_FLUSH_THRESHOLD_PERCENT,
        })
    }

    /// Set how full a half must be, in percent, before it is forwarded
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidFlushThreshold`] outside 1..=100.
    pub fn with_flush_threshold(mut self, percent: u8) -> Result<Self, TeeError> {
        if !(1..=100).contains(&percent) {
            return Err(ConfigurationError::InvalidFlushThreshold { percent }.into());
        }
        self.flush_threshold_percent = percent;
        Ok(self)
    }

    /// Create a pump from configuration
    ///
    /// # Errors
    ///
    /// Same as [`CopyPump::new`] and [`CopyPump::with_flush_threshold`].
    pub fn from_config(config: &PumpConfig) -> Result<Self, TeeError> {
        Self::new(config.buffer_size)?.with_flush_threshold(config.flush_threshold_percent)
    }

    /// Total staging size
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Size of each staging half
    #[must_use]
    pub fn half_size(&self) -> usize {
        self.buffer_size / 2
    }

    /// Configured flush threshold
    #[must_use]
    pub fn flush_threshold_percent(&self) -> u8 {
        self.flush_threshold_percent
    }

    fn past_threshold(&self, staged: &Staging) -> bool {
        staged.is_full()
            || staged.filled * 100 > staged.buf.len() * usize::from(self.flush_threshold_percent)
    }

    /// Copy everything from `source` into `tee`, then signal end-of-input
    ///
    /// Every chunk reaches the tee in source order. The end signal is only
    /// sent after a clean finish; on failure the tee is left open so the
    /// caller decides how to shut it down.
    ///
    /// # Errors
    ///
    /// - [`TeeError::Cancelled`] if `cancel` fires
    /// - [`TeeError::Source`] if the source fails
    /// - any error from [`TeeStream::write`]
    /// - [`TeeError::Aggregate`] if the overlapped read and write both fail
    pub async fn run<S>(
        &self,
        source: &mut S,
        tee: &TeeStream,
        cancel: &CancellationToken,
    ) -> Result<PumpReport, TeeError>
    where
        S: ByteSource + ?Sized,
    {
        let half = self.half_size();
        let mut filling = Staging::new(half);
        let mut draining = Staging::new(half);
        let mut report = PumpReport::default();

        tracing::debug!(
            half_size = half,
            threshold = self.flush_threshold_percent,
            "Copy pump started"
        );

        loop {
            if cancel.is_cancelled() {
                return Err(TeeError::Cancelled);
            }

            let (read_result, write_result) = tokio::join!(
                source.read(filling.unfilled_mut(), cancel),
                async {
                    if draining.is_empty() {
                        Ok(())
                    } else {
                        tee.write(draining.data(), cancel).await
                    }
                },
            );

            let mut errors = Vec::new();
            let read = match read_result {
                Ok(n) => n,
                Err(err) => {
                    errors.push(source_error(err, cancel));
                    0
                }
            };
            match write_result {
                Ok(()) if !draining.is_empty() => {
                    report.writes += 1;
                    report.bytes_copied += draining.filled as u64;
                }
                Ok(()) => {}
                Err(err) => errors.push(err),
            }
            if let Some(err) = TeeError::aggregate(errors) {
                tracing::debug!(error = %err, bytes_copied = report.bytes_copied, "Copy pump failed");
                return Err(err);
            }

            draining.clear();
            report.reads += 1;
            filling.filled += read;

            if self.past_threshold(&filling) || (read == 0 && !filling.is_empty()) {
                std::mem::swap(&mut filling, &mut draining);
            }
            if read == 0 {
                break;
            }
        }

        for staged in [&draining, &filling] {
            if !staged.is_empty() {
                tee.write(staged.data(), cancel).await?;
                report.writes += 1;
                report.bytes_copied += staged.filled as u64;
            }
        }

        tee.set_at_end();
        tracing::info!(
            bytes_copied = report.bytes_copied,
            reads = report.reads,
            writes = report.writes,
            "Copy pump finished"
        );
        Ok(report)
    }
}

fn source_error(err: io::Error, cancel: &CancellationToken) -> TeeError {
    if cancel.is_cancelled() && err.kind() == io::ErrorKind::Interrupted {
        TeeError::Cancelled
    } else {
        TeeError::Source(err)
    }
}
