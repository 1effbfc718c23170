//! Sink Capability
//!
//! Destinations a [`crate::TeeStream`] forwards to. The engine knows nothing
//! about files, pipes or sockets; anything implementing [`ByteSink`] can be
//! fanned out to. [`AsyncWriteSink`] adapts any tokio `AsyncWrite`.
//!
//! The self-buffer is requested with [`SinkSpec::SelfBuffered`] in the sink
//! list instead of a magic sentinel sink.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A writable byte destination
///
/// Methods take `&self` so one tee can drive the same sink from concurrent
/// fan-outs; implementations serialize internally.
#[async_trait]
pub trait ByteSink: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str {
        "sink"
    }

    /// Whether the sink accepts writes
    fn is_writable(&self) -> bool;

    /// Write all of `buf`
    ///
    /// Implementations should stop early when `cancel` fires.
    async fn write(&self, buf: &[u8], cancel: &CancellationToken) -> io::Result<()>;

    /// Flush buffered data to the underlying destination
    async fn flush(&self, cancel: &CancellationToken) -> io::Result<()>;

    /// Close the sink; no writes follow
    async fn close(&self) -> io::Result<()>;
}

/// One entry of the sink list a tee is built from
#[derive(Clone)]
pub enum SinkSpec {
    /// Forward to an external sink
    External(Arc<dyn ByteSink>),
    /// Buffer written bytes internally so the tee itself can be read
    SelfBuffered,
}

impl SinkSpec {
    /// Wrap an external sink
    pub fn external(sink: impl ByteSink + 'static) -> Self {
        Self::External(Arc::new(sink))
    }

    /// Check if this is the self-buffer marker
    #[must_use]
    pub fn is_self_buffered(&self) -> bool {
        matches!(self, Self::SelfBuffered)
    }
}

impl From<Arc<dyn ByteSink>> for SinkSpec {
    fn from(sink: Arc<dyn ByteSink>) -> Self {
        Self::External(sink)
    }
}

impl fmt::Debug for SinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(sink) => f.debug_tuple("External").field(&sink.name()).finish(),
            Self::SelfBuffered => f.write_str("SelfBuffered"),
        }
    }
}

pub(crate) fn cancelled_io() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "operation cancelled")
}

// =============================================================================
// AsyncWrite Adapter
// =============================================================================

/// Sink over any tokio `AsyncWrite`
///
/// Writes are serialized through an async mutex so concurrent fan-outs never
/// interleave inside one `write_all`.
pub struct AsyncWriteSink<W> {
    name: String,
    writable: bool,
    inner: Mutex<W>,
}

impl<W> AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a writable sink
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writable: true,
            inner: Mutex::new(writer),
        }
    }

    /// Create a sink that reports itself as not writable
    ///
    /// Useful for destinations opened read-only; a tee refuses to be built
    /// over it.
    pub fn read_only(name: impl Into<String>, writer: W) -> Self {
        Self {
            writable: false,
            ..Self::new(name, writer)
        }
    }

    /// Take the writer back out of the sink
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }

    /// Run `f` with exclusive access to the writer
    pub async fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }
}

impl<W> fmt::Debug for AsyncWriteSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWriteSink")
            .field("name", &self.name)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<W> ByteSink for AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    async fn write(&self, buf: &[u8], cancel: &CancellationToken) -> io::Result<()> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "sink is not writable",
            ));
        }
        let mut writer = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled_io()),
            guard = self.inner.lock() => guard,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(cancelled_io()),
            result = writer.write_all(buf) => result,
        }
    }

    async fn flush(&self, cancel: &CancellationToken) -> io::Result<()> {
        let mut writer = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled_io()),
            guard = self.inner.lock() => guard,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(cancelled_io()),
            result = writer.flush() => result,
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_flush_into_vec() {
        let sink = AsyncWriteSink::new("memory", Vec::new());
        let cancel = CancellationToken::new();

        sink.write(b"hello ", &cancel).await.unwrap();
        sink.write(b"world", &cancel).await.unwrap();
        sink.flush(&cancel).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(sink.name(), "memory");
        assert_eq!(sink.into_inner(), b"hello world".to_vec());
    }

    #[tokio::test]
    async fn test_read_only_sink_rejects_writes() {
        let sink = AsyncWriteSink::read_only("ro", Vec::new());
        assert!(!sink.is_writable());

        let err = sink
            .write(b"x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_cancelled_write_reports_interrupted() {
        let sink = AsyncWriteSink::new("memory", Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sink.write(b"data", &cancel).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(sink.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_with_writer_access() {
        let sink = AsyncWriteSink::new("memory", Vec::new());
        sink.write(b"abc", &CancellationToken::new()).await.unwrap();
        let len = sink.with_writer(|w| w.len()).await;
        assert_eq!(len, 3);
    }

    #[test]
    fn test_sink_spec_debug() {
        let spec = SinkSpec::external(AsyncWriteSink::new("out", Vec::new()));
        assert_eq!(format!("{spec:?}"), "External(\"out\")");
        assert!(!spec.is_self_buffered());
        assert!(SinkSpec::SelfBuffered.is_self_buffered());
    }
}
