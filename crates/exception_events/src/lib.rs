#![forbid(unsafe_code)]
//! Serializable error records and the synchronous half of the exception pipeline.
//!
//! This crate owns no runtime. It provides:
//! - [`StackFrame`] plus [`sanitize`], which drops non-serializable [`DebugContext`] payloads.
//! - [`RawErrorEvent`], the capture-side payload adapters build from host signals.
//! - [`Normalizer`], which turns a raw event into a timestamped [`ErrorRecord`] under an
//!   explicit [`HttpErrorPolicy`].
//! - The [`TraceComputer`] seam with a text backtrace parser as the default implementation.
//!
//! Batching, transport, and environment profiling live in `exception_monitor`.

mod error;
mod frame;
mod normalize;
mod raw;
mod record;
mod trace;

pub use error::{NormalizeError, TraceError};
pub use frame::{sanitize, DebugContext, StackFrame};
pub use normalize::{HttpErrorPolicy, Normalizer};
pub use raw::RawErrorEvent;
pub use record::{ErrorRecord, RESERVED_KEYS};
pub use trace::{TextTraceComputer, TraceComputer};
