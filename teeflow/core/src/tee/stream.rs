//! Tee Stream Implementation
//!
//! Fans writes out to external sinks and, when built with
//! [`SinkSpec::SelfBuffered`], copies them into a ring buffer that the tee's
//! own [`TeeStream::read`] drains.

use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::{PumpConfig, TeeConfig};
use crate::error::{ConfigurationError, SinkFailure, TeeError, MIN_BUFFER_SIZE};
use crate::pump::{CopyPump, PumpReport};
use crate::ring_buffer::RingBuffer;
use crate::sink::{ByteSink, SinkSpec};
use crate::source::ByteSource;

/// An external sink with its position in the original sink list
struct SinkEntry {
    index: usize,
    sink: Arc<dyn ByteSink>,
}

/// Point-in-time snapshot of a tee's counters and flags
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeeStats {
    /// Bytes accepted by [`TeeStream::write`]
    pub bytes_written: u64,
    /// Bytes handed out by [`TeeStream::read`]
    pub bytes_read: u64,
    /// Bytes currently waiting in the self-buffer
    pub buffered: usize,
    /// Whether any byte reached the self-buffer yet
    pub first_byte_received: bool,
    /// Whether end-of-input was signaled
    pub at_end: bool,
    /// Whether the tee was closed
    pub closed: bool,
}

/// A write-side multiplexer that can optionally be read back
///
/// Share it behind an `Arc` to write from one task while reading from
/// another. Overlapping writes from different callers are not ordered
/// relative to each other.
pub struct TeeStream {
    sinks: Vec<SinkEntry>,
    buffer: Option<RingBuffer>,
    /// Woken when bytes land in the buffer or end-of-input is signaled
    data_ready: Notify,
    /// Woken when a read frees buffer space or the tee closes
    space_freed: Notify,
    first_byte_received: AtomicBool,
    at_end: AtomicBool,
    closed: AtomicBool,
    total_bytes_read: AtomicU64,
    total_bytes_written: AtomicU64,
    buffer_size: usize,
    pump: PumpConfig,
}

impl TeeStream {
    /// Create a tee over `sinks` with the given self-buffer size
    ///
    /// # Errors
    ///
    /// Returns [`TeeError::Configuration`] if the sink list is empty,
    /// `buffer_size` is below 1024, a sink is not writable, or more than one
    /// [`SinkSpec::SelfBuffered`] entry is present.
    pub fn new(
        buffer_size: usize,
        sinks: impl IntoIterator<Item = SinkSpec>,
    ) -> Result<Self, TeeError> {
        Self::build(buffer_size, PumpConfig::default(), sinks)
    }

    /// Create a tee sized from a loaded configuration
    ///
    /// # Errors
    ///
    /// Same as [`TeeStream::new`].
    pub fn with_config(
        config: &TeeConfig,
        sinks: impl IntoIterator<Item = SinkSpec>,
    ) -> Result<Self, TeeError> {
        Self::build(config.buffer_size, config.pump.clone(), sinks)
    }

    fn build(
        buffer_size: usize,
        pump: PumpConfig,
        sinks: impl IntoIterator<Item = SinkSpec>,
    ) -> Result<Self, TeeError> {
        let specs: Vec<SinkSpec> = sinks.into_iter().collect();
        if specs.is_empty() {
            return Err(ConfigurationError::NoSinks.into());
        }
        if buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigurationError::BufferTooSmall {
                size: buffer_size,
                min: MIN_BUFFER_SIZE,
            }
            .into());
        }

        let mut external = Vec::with_capacity(specs.len());
        let mut self_index: Option<usize> = None;
        for (index, spec) in specs.into_iter().enumerate() {
            match spec {
                SinkSpec::SelfBuffered => {
                    if let Some(first) = self_index {
                        return Err(ConfigurationError::MultipleSelfBuffers {
                            first,
                            duplicate: index,
                        }
                        .into());
                    }
                    self_index = Some(index);
                }
                SinkSpec::External(sink) => {
                    if !sink.is_writable() {
                        return Err(ConfigurationError::SinkNotWritable {
                            index,
                            name: sink.name().to_string(),
                        }
                        .into());
                    }
                    external.push(SinkEntry { index, sink });
                }
            }
        }

        let buffer = match self_index {
            Some(_) => Some(RingBuffer::new(buffer_size)?),
            None => None,
        };

        tracing::info!(
            sinks = external.len(),
            self_buffered = buffer.is_some(),
            buffer_size = buffer_size,
            "Tee stream created"
        );

        Ok(Self {
            sinks: external,
            buffer,
            data_ready: Notify::new(),
            space_freed: Notify::new(),
            first_byte_received: AtomicBool::new(false),
            at_end: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            total_bytes_read: AtomicU64::new(0),
            total_bytes_written: AtomicU64::new(0),
            buffer_size,
            pump,
        })
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    /// True iff the tee was built with a self-buffer
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.buffer.is_some()
    }

    /// True until the tee is closed
    #[must_use]
    pub fn can_write(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Always false; the tee is a forward-only pipe
    #[must_use]
    pub fn can_seek(&self) -> bool {
        false
    }

    /// Configured self-buffer size
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of external sinks
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Names of the external sinks, in list order
    #[must_use]
    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|e| e.sink.name().to_string()).collect()
    }

    /// Snapshot of counters and flags
    #[must_use]
    pub fn stats(&self) -> TeeStats {
        TeeStats {
            bytes_written: self.total_bytes_written.load(Ordering::Relaxed),
            bytes_read: self.total_bytes_read.load(Ordering::Relaxed),
            buffered: self.buffer.as_ref().map_or(0, RingBuffer::len),
            first_byte_received: self.first_byte_received.load(Ordering::Acquire),
            at_end: self.at_end.load(Ordering::Acquire),
            closed: self.closed.load(Ordering::Acquire),
        }
    }

    // ========================================================================
    // Write Path
    // ========================================================================

    /// Forward `buf` to every external sink and into the self-buffer
    ///
    /// Sink writes run concurrently and all of them finish before this
    /// returns. The self-buffer copy then waits for space as needed; bytes
    /// become readable chunk by chunk.
    ///
    /// # Errors
    ///
    /// - [`TeeError::Closed`] after [`TeeStream::close`]
    /// - [`TeeError::Cancelled`] if `cancel` fires before or during the call
    /// - [`TeeError::Sinks`] with every failed sink; the self-buffer copy is
    ///   skipped in that case
    pub async fn write(&self, buf: &[u8], cancel: &CancellationToken) -> Result<(), TeeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TeeError::Closed);
        }
        if cancel.is_cancelled() {
            return Err(TeeError::Cancelled);
        }
        if buf.is_empty() {
            return Ok(());
        }

        if !self.sinks.is_empty() {
            let results = join_all(self.sinks.iter().map(|e| e.sink.write(buf, cancel))).await;
            self.check_fan_out("write", results, cancel)?;
        }

        if let Some(ring) = &self.buffer {
            self.buffer_write(ring, buf, cancel).await?;
        }

        self.total_bytes_written
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Copy `data` into the ring, waiting for space whenever it is full
    async fn buffer_write(
        &self,
        ring: &RingBuffer,
        mut data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), TeeError> {
        while !data.is_empty() {
            if cancel.is_cancelled() {
                return Err(TeeError::Cancelled);
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(TeeError::Closed);
            }

            // Register before checking so a read between check and sleep still wakes us
            let mut space = pin!(self.space_freed.notified());
            space.as_mut().enable();

            let written = ring.write_some(data);
            if written > 0 {
                data = &data[written..];
                self.first_byte_received.store(true, Ordering::Release);
                self.data_ready.notify_waiters();
                tracing::trace!(bytes = written, remaining = data.len(), "Buffered chunk");
                continue;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TeeError::Cancelled),
                () = space => {}
            }
        }
        Ok(())
    }

    /// Flush every external sink concurrently
    ///
    /// # Errors
    ///
    /// [`TeeError::Closed`], [`TeeError::Cancelled`] or [`TeeError::Sinks`].
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<(), TeeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TeeError::Closed);
        }
        if cancel.is_cancelled() {
            return Err(TeeError::Cancelled);
        }
        let results = join_all(self.sinks.iter().map(|e| e.sink.flush(cancel))).await;
        self.check_fan_out("flush", results, cancel)
    }

    fn check_fan_out(
        &self,
        op: &'static str,
        results: Vec<io::Result<()>>,
        cancel: &CancellationToken,
    ) -> Result<(), TeeError> {
        let failures = self.collect_failures(op, results);
        if failures.is_empty() {
            Ok(())
        } else if cancel.is_cancelled() {
            Err(TeeError::Cancelled)
        } else {
            Err(TeeError::Sinks(failures))
        }
    }

    fn collect_failures(&self, op: &'static str, results: Vec<io::Result<()>>) -> Vec<SinkFailure> {
        self.sinks
            .iter()
            .zip(results)
            .filter_map(|(entry, result)| {
                let source = result.err()?;
                tracing::warn!(
                    op = op,
                    sink_index = entry.index,
                    sink = entry.sink.name(),
                    error = %source,
                    "Sink operation failed"
                );
                Some(SinkFailure {
                    index: entry.index,
                    sink: entry.sink.name().to_string(),
                    source,
                })
            })
            .collect()
    }

    // ========================================================================
    // Read Path
    // ========================================================================

    /// Read buffered bytes, waiting until data arrives or input ends
    ///
    /// Returns 0 only once [`TeeStream::set_at_end`] was called and the
    /// buffer is drained. An empty `buf` returns 0 immediately.
    ///
    /// # Errors
    ///
    /// - [`TeeError::Unsupported`] if the tee has no self-buffer
    /// - [`TeeError::Cancelled`] if `cancel` fires before data is available
    pub async fn read(&self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize, TeeError> {
        let ring = self.buffer.as_ref().ok_or(TeeError::Unsupported("read"))?;
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if cancel.is_cancelled() {
                return Err(TeeError::Cancelled);
            }

            let mut ready = pin!(self.data_ready.notified());
            ready.as_mut().enable();

            // Load the end flag first: bytes written before set_at_end are
            // then guaranteed to be visible to the read below.
            let ended = self.at_end.load(Ordering::Acquire);
            let count = ring.read(buf);
            if count > 0 {
                self.total_bytes_read
                    .fetch_add(count as u64, Ordering::Relaxed);
                self.space_freed.notify_waiters();
                return Ok(count);
            }
            if ended {
                return Ok(0);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TeeError::Cancelled),
                () = ready => {}
            }
        }
    }

    /// Signal that no more input will arrive
    ///
    /// Buffered bytes stay readable; once drained, reads return 0.
    pub fn set_at_end(&self) {
        if !self.at_end.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                bytes_written = self.total_bytes_written.load(Ordering::Relaxed),
                "End of input signaled"
            );
        }
        self.data_ready.notify_waiters();
    }

    /// Check whether end-of-input was signaled
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.at_end.load(Ordering::Acquire)
    }

    // ========================================================================
    // Pump
    // ========================================================================

    /// Drain `source` into this tee, then signal end-of-input
    ///
    /// Uses a [`CopyPump`] sized by the pump configuration this tee was
    /// built with.
    ///
    /// # Errors
    ///
    /// See [`CopyPump::run`].
    pub async fn copy_from<S>(
        &self,
        source: &mut S,
        cancel: &CancellationToken,
    ) -> Result<PumpReport, TeeError>
    where
        S: ByteSource + ?Sized,
    {
        let pump = CopyPump::from_config(&self.pump)?;
        pump.run(source, self, cancel).await
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Close every external sink and release the self-buffer
    ///
    /// Wakes blocked readers (they observe end-of-stream) and blocked writers
    /// (they fail with [`TeeError::Closed`]). Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`TeeError::Sinks`] if any sink failed to close; all sinks are still
    /// attempted and the buffer is still released.
    pub async fn close(&self) -> Result<(), TeeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let results = join_all(self.sinks.iter().map(|e| e.sink.close())).await;
        let failures = self.collect_failures("close", results);

        self.at_end.store(true, Ordering::Release);
        if let Some(ring) = &self.buffer {
            ring.release();
        }
        self.data_ready.notify_waiters();
        self.space_freed.notify_waiters();

        tracing::info!(
            bytes_written = self.total_bytes_written.load(Ordering::Relaxed),
            bytes_read = self.total_bytes_read.load(Ordering::Relaxed),
            failed_sinks = failures.len(),
            "Tee stream closed"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeeError::Sinks(failures))
        }
    }

    // ========================================================================
    // Unsupported Stream Operations
    // ========================================================================

    /// Not supported
    ///
    /// # Errors
    ///
    /// Always [`TeeError::Unsupported`].
    pub fn seek(&self, _pos: SeekFrom) -> Result<u64, TeeError> {
        Err(TeeError::Unsupported("seek"))
    }

    /// Not supported
    ///
    /// # Errors
    ///
    /// Always [`TeeError::Unsupported`].
    pub fn position(&self) -> Result<u64, TeeError> {
        Err(TeeError::Unsupported("position"))
    }

    /// Not supported
    ///
    /// # Errors
    ///
    /// Always [`TeeError::Unsupported`].
    pub fn stream_len(&self) -> Result<u64, TeeError> {
        Err(TeeError::Unsupported("length"))
    }

    /// Not supported
    ///
    /// # Errors
    ///
    /// Always [`TeeError::Unsupported`].
    pub fn set_stream_len(&self, _len: u64) -> Result<(), TeeError> {
        Err(TeeError::Unsupported("set_length"))
    }
}

impl Drop for TeeStream {
    fn drop(&mut self) {
        if !*self.closed.get_mut() && !self.sinks.is_empty() {
            tracing::warn!(
                sinks = self.sinks.len(),
                "Tee stream dropped without close; external sinks were not closed"
            );
        }
    }
}

impl fmt::Debug for TeeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeStream")
            .field("sinks", &self.sink_names())
            .field("self_buffered", &self.buffer.is_some())
            .field("buffer_size", &self.buffer_size)
            .field("stats", &self.stats())
            .finish()
    }
}
