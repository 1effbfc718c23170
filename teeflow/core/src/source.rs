//! Source Capability
//!
//! Origins a [`crate::CopyPump`] drains. A read returning 0 means the source
//! is exhausted.

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::sink::cancelled_io;

/// A readable byte origin
#[async_trait]
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` means exhausted
    async fn read(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> io::Result<usize>;
}

/// Source over any tokio `AsyncRead`
pub struct AsyncReadSource<R> {
    inner: R,
}

impl<R> AsyncReadSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self { inner: reader }
    }

    /// Take the reader back
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> fmt::Debug for AsyncReadSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReadSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl<R> ByteSource for AsyncReadSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> io::Result<usize> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(cancelled_io()),
            result = self.inner.read(buf) => result,
        }
    }
}
