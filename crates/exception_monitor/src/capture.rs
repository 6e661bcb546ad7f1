//! Capture adapters feeding host error signals into a [`MonitorHandle`].
//!
//! - [`install_panic_hook`] subscribes to the process-wide panic channel.
//! - [`ChainedExceptionSink`] joins a host framework's exception-handler chain as
//!   one more link, always calling the previously registered sink first.

use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    panic::{self, Location},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use exception_events::RawErrorEvent;
use tracing::error;

use crate::MonitorHandle;

static PANIC_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Reports every panic to `monitor` after running the previously installed hook.
///
/// Only the first call installs a hook; later calls return `false` and change nothing.
/// The hook only builds the event. Normalization happens on the scheduler task, so a
/// panicking trace computer cannot panic inside the hook.
pub fn install_panic_hook(monitor: MonitorHandle) -> bool {
    if PANIC_HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        previous(info);
        monitor.defer_error(panic_event(info.payload(), info.location()));
    }));
    true
}

pub(crate) fn panic_event(
    payload: &(dyn Any + Send),
    location: Option<&Location<'_>>,
) -> RawErrorEvent {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());

    let mut event = RawErrorEvent::new(message).with_name("panic");
    if let Some(location) = location {
        event = event
            .with_property("file", location.file())
            .with_property("line", location.line())
            .with_property("column", location.column());
    }
    if let Some(stack) = captured_backtrace() {
        event = event.with_stack(stack);
    }
    event
}

/// Symbols of the frames between the capture site and the code that raised the error.
const CAPTURE_FRAMES: &[&str] = &[
    "std::backtrace_rs::",
    "std::backtrace::Backtrace::",
    "exception_monitor::capture::",
    "exception_monitor::MonitorHandle::handle_new_error",
    "core::ops::function::Fn",
    "std::panicking::",
    "std::sys::backtrace::",
    "std::sys_common::backtrace::",
    "rust_begin_unwind",
    "core::panicking::",
];

pub(crate) fn captured_backtrace() -> Option<String> {
    let backtrace = Backtrace::force_capture();
    (backtrace.status() == BacktraceStatus::Captured)
        .then(|| trim_capture_frames(&backtrace.to_string()))
}

/// Drops the leading frames that belong to backtrace capture and panic dispatch, so
/// the first remaining frame is where the error was raised.
fn trim_capture_frames(rendered: &str) -> String {
    let mut trimming = true;
    let mut skipping = false;
    let mut kept = Vec::new();
    for line in rendered.lines() {
        if trimming {
            if let Some(symbol) = frame_symbol(line) {
                skipping = CAPTURE_FRAMES.iter().any(|marker| symbol.contains(marker));
                trimming = skipping;
            }
            if skipping {
                continue;
            }
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Symbol of a `  N: symbol` frame header line.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.trim_start().split_once(": ")?;
    (!index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())).then_some(symbol)
}

/// An exception as a host framework hands it to its handler chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exception {
    pub message: String,
    pub name: Option<String>,
    pub stack: Option<String>,
}

impl Exception {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// A link in a host framework's exception-handler chain.
pub trait ExceptionSink: Send + Sync {
    fn handle_exception(&self, exception: &Exception, cause: Option<&str>);
}

impl<F> ExceptionSink for F
where
    F: Fn(&Exception, Option<&str>) + Send + Sync,
{
    fn handle_exception(&self, exception: &Exception, cause: Option<&str>) {
        self(exception, cause)
    }
}

/// Default framework behaviour: log the exception and carry on.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingExceptionSink;

impl ExceptionSink for LoggingExceptionSink {
    fn handle_exception(&self, exception: &Exception, cause: Option<&str>) {
        error!(
            cause,
            stack = exception.stack.as_deref(),
            "{}",
            exception.message
        );
    }
}

/// Forwards to the previous sink, then reports the exception to the monitor with its
/// message replaced by the stack representation.
pub struct ChainedExceptionSink {
    previous: Option<Arc<dyn ExceptionSink>>,
    monitor: MonitorHandle,
}

impl ChainedExceptionSink {
    pub fn new(previous: Option<Arc<dyn ExceptionSink>>, monitor: MonitorHandle) -> Self {
        Self { previous, monitor }
    }
}

impl std::fmt::Debug for ChainedExceptionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedExceptionSink")
            .field("has_previous", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

impl ExceptionSink for ChainedExceptionSink {
    fn handle_exception(&self, exception: &Exception, cause: Option<&str>) {
        if let Some(previous) = &self.previous {
            previous.handle_exception(exception, cause);
        }
        self.monitor.handle_error(exception_event(exception, cause));
    }
}

pub(crate) fn exception_event(exception: &Exception, cause: Option<&str>) -> RawErrorEvent {
    let message = exception
        .stack
        .clone()
        .filter(|stack| !stack.trim().is_empty())
        .unwrap_or_else(|| exception.message.clone());
    let mut event = RawErrorEvent::new(message);
    event.name = exception.name.clone();
    event.stack = exception.stack.clone();
    if let Some(cause) = cause {
        event = event.with_property("cause", cause);
    }
    event
}
