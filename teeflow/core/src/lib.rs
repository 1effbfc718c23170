//! Teeflow Core - Concurrent Stream Multiplexing
//!
//! This crate duplicates one byte stream into many. A [`TeeStream`] forwards
//! every write to a list of sinks concurrently and can keep an internal
//! buffered copy that is read back through the tee itself. A [`CopyPump`]
//! drains a source into a tee with reads and writes overlapped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌───────────────────────────┐
//! │  ByteSource  │────▶│   CopyPump   │────▶│         TeeStream         │
//! │ (stdin, file │     │ double-buffer│     │  ┌───────┐ ┌───────┐      │
//! │  socket ...) │     │   staging    │     │  │sink 0 │ │sink N │ ...  │
//! └──────────────┘     └──────────────┘     │  └───────┘ └───────┘      │
//!                                           │  ┌─────────────────────┐  │
//!                                           │  │ RingBuffer (opt.)   │──┼──▶ read()
//!                                           │  └─────────────────────┘  │
//!                                           └───────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`RingBuffer`]: Fixed-capacity circular byte queue
//! - [`TeeStream`]: Fan-out writer with optional self-buffer
//! - [`CopyPump`]: Overlapped source-to-tee copier
//! - [`ByteSink`] / [`ByteSource`]: Capabilities the engine is generic over
//! - [`TeeConfig`]: Layered configuration (CLI, env, file, defaults)
//!
//! # Quick Start
//!
//! ```ignore
//! use teeflow_core::{AsyncReadSource, AsyncWriteSink, SinkSpec, TeeStream};
//! use tokio_util::sync::CancellationToken;
//!
//! let file = tokio::fs::File::create("copy.bin").await?;
//! let tee = TeeStream::new(
//!     64 * 1024,
//!     [
//!         SinkSpec::external(AsyncWriteSink::new("stdout", tokio::io::stdout())),
//!         SinkSpec::external(AsyncWriteSink::new("copy.bin", file)),
//!     ],
//! )?;
//!
//! let cancel = CancellationToken::new();
//! let mut stdin = AsyncReadSource::new(tokio::io::stdin());
//! tee.copy_from(&mut stdin, &cancel).await?;
//! tee.close().await?;
//! ```
//!
//! # Module Overview
//!
//! - [`ring_buffer`]: Circular byte queue behind the self-buffer
//! - [`tee`]: The tee stream and its statistics
//! - [`pump`]: Double-buffered copier
//! - [`sink`]: Sink capability and the `AsyncWrite` adapter
//! - [`source`]: Source capability and the `AsyncRead` adapter
//! - [`error`]: Error types
//! - [`config`]: Configuration loading

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod pump;
pub mod ring_buffer;
pub mod sink;
pub mod source;
pub mod tee;

// Engine exports
pub use pump::{CopyPump, PumpReport, DEFAULT_FLUSH_THRESHOLD_PERCENT, MIN_PUMP_BUFFER_SIZE};
pub use ring_buffer::{RingBuffer, DEFAULT_RING_CAPACITY};
pub use tee::{TeeStats, TeeStream};

// Capability exports
pub use sink::{AsyncWriteSink, ByteSink, SinkSpec};
pub use source::{AsyncReadSource, ByteSource};

// Error exports
pub use error::{ConfigurationError, SinkFailure, TeeError, MIN_BUFFER_SIZE};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, PumpConfig, TeeConfig, TeeflowToml,
};

// Re-exported so callers need not depend on tokio-util directly
pub use tokio_util::sync::CancellationToken;
