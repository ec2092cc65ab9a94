//! # spillway - deduplicated write-behind for raw descriptors
//!
//! spillway queues references to in-memory byte regions for background
//! delivery to file descriptors, returning control to the caller
//! immediately. One worker thread per destination performs the blocking
//! writes in submission order. A source region is never queued twice
//! concurrently for the same destination, and callers can wait for delivery
//! before reusing or unmapping the memory.
//!
//! ## Core Concepts
//!
//! - **[`BufferRef`]**: a borrowed view of caller-owned bytes; the engine
//!   never copies or frees them
//! - **[`SourceToken`]**: the identity a region is deduplicated and drained
//!   by while in flight
//! - **[`Destination`]**: an already-open, write-capable descriptor whose
//!   lifecycle the caller owns
//! - **[`CompletionStream`]**: per-item outcomes, including truncations the
//!   delivery path itself never retries or propagates
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spillway::{BufferRef, Destination, Spillway};
//!
//! let engine = Spillway::with_defaults();
//! let dest = Destination::from_fd(&child_stdin);
//!
//! // Hand a frame to the engine; returns once queued, not written.
//! let frame = unsafe { BufferRef::from_raw(frame.as_ptr(), frame.len()) };
//! engine.submit(frame, dest)?;
//!
//! // Before reusing the frame's memory:
//! engine.drain_token(frame.token());
//!
//! // Flush everything and stop the workers.
//! engine.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod engine;
pub mod error;
pub mod events;

mod io;
mod state;

// Re-export primary types at crate root for convenience
pub use buffer::{BufferRef, Destination, SourceToken};
pub use engine::{Spillway, SpillwayConfig};
pub use error::{RuntimeError, SpillError, SpillResult, ValidationError};
pub use events::{CompletionEvent, CompletionStream, SubscriptionId, WriteOutcome};
