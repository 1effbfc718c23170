//! Tee Stream
//!
//! One write-side stream that forwards every byte to a fixed list of sinks.
//!
//! # Architecture
//!
//! ```text
//!                    write(buf)
//!                        │
//!            ┌───────────┴──────────────┐
//!            │        join_all          │
//!       ┌────┴────┐ ┌─────────┐ ┌──────┴──┐
//!       │ sink 0  │ │ sink 1  │ │ sink N  │     external sinks
//!       └─────────┘ └─────────┘ └─────────┘
//!                        │
//!                 (all succeeded)
//!                        ▼
//!              ┌───────────────────┐   data_ready   ┌──────────┐
//!              │    RingBuffer     │ ─────────────▶ │  read()  │
//!              │  (self-buffer)    │ ◀───────────── │          │
//!              └───────────────────┘   space_freed  └──────────┘
//! ```
//!
//! The self-buffer only exists when the sink list contains
//! [`crate::SinkSpec::SelfBuffered`]. Writers wait for space, readers wait for
//! data or the end signal; neither spins.

mod stream;

pub use stream::{TeeStats, TeeStream};
