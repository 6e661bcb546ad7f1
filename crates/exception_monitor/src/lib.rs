#![forbid(unsafe_code)]
//! Client-side exception monitoring.
//!
//! A [`Monitor`] captures uncaught errors, normalizes them into [`ErrorRecord`]s, batches
//! them inside a fixed flush window and ships each batch to a collector without ever
//! blocking or failing the host application.
//!
//! ```rust,no_run
//! use exception_monitor::{Monitor, Mode};
//!
//! # async fn example() -> Result<(), exception_monitor::MonitorError> {
//! let monitor = Monitor::builder()
//!     .app_id("a1b2c3")
//!     .mode(Mode::Development)
//!     .build()?;
//! monitor.install_panic_hook();
//! monitor.handle().ready();
//! # Ok(())
//! # }
//! ```
//!
//! Errors enter through [`MonitorHandle::handle_error`] (or the capture adapters built
//! on it), pass through the [`Normalizer`], and are queued by a scheduler task that owns
//! the batch. The first record of a window arms a single flush deadline; the batch is
//! sent when it expires, in enqueue order, and the queue is cleared whatever the
//! transmission outcome.

use std::{
    any::type_name,
    cell::Cell,
    error::Error as StdError,
    iter,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};

mod builder;
mod capture;
mod defaults;
mod error;
mod identity;
mod profile;
mod scheduler;
mod transport;

pub use builder::{Mode, MonitorBuilder};
pub use capture::{
    install_panic_hook, ChainedExceptionSink, Exception, ExceptionSink, LoggingExceptionSink,
};
pub use defaults::IDENTITY_KEY;
pub use error::{IdentityError, MonitorError, ProfileError, TransportError};
pub use exception_events::{
    sanitize, DebugContext, ErrorRecord, HttpErrorPolicy, NormalizeError, Normalizer,
    RawErrorEvent, StackFrame, TextTraceComputer, TraceComputer, TraceError,
};
pub use identity::{
    load_or_create_identity, FileIdentityStore, IdentifyPayload, IdentityStore,
    MemoryIdentityStore,
};
pub use profile::{
    BrowserInfo, DeviceInfo, EnvironmentProfile, NativeBridge, ProfileCollector, ProfileSource,
};
pub use scheduler::{FlushWindow, SchedulerStats, WindowState};
pub use transport::{DiagnosticTransport, Framework, HttpTransport, TransmissionPayload, Transport};

use scheduler::SchedulerCommand;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

/// A running monitor: the scheduler task plus a handle for feeding it.
#[derive(Debug)]
pub struct Monitor {
    handle: MonitorHandle,
    task: JoinHandle<()>,
}

impl Monitor {
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    pub(crate) fn new(handle: MonitorHandle, task: JoinHandle<()>) -> Self {
        Self { handle, task }
    }

    /// Cloneable handle for capture sites.
    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Routes panics to this monitor. See [`install_panic_hook`].
    pub fn install_panic_hook(&self) -> bool {
        install_panic_hook(self.handle())
    }

    /// Stops the scheduler. A batch still waiting for its window is discarded; the
    /// number of discarded records is returned.
    pub async fn shutdown(self) -> usize {
        let (ack, reply) = oneshot::channel();
        let dropped = match self.handle.inner.commands.send(SchedulerCommand::Shutdown(ack)) {
            Ok(()) => reply.await.unwrap_or(0),
            Err(_) => 0,
        };
        if let Err(err) = self.task.await {
            debug!(error = %err, "flush scheduler task ended abnormally");
        }
        dropped
    }
}

/// Cheap, cloneable entry point into a running [`Monitor`].
#[derive(Clone)]
pub struct MonitorHandle {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) app_id: String,
    pub(crate) normalizer: Normalizer,
    pub(crate) commands: mpsc::UnboundedSender<SchedulerCommand>,
    pub(crate) profile: Arc<ProfileCollector>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) identity_store: Arc<dyn IdentityStore>,
    pub(crate) identified: AtomicBool,
    pub(crate) runtime: Handle,
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("app_id", &self.inner.app_id)
            .field("policy", &self.inner.normalizer.policy())
            .field("closed", &self.inner.commands.is_closed())
            .finish_non_exhaustive()
    }
}

impl MonitorHandle {
    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    /// Normalizes `raw` and queues it for the current flush window.
    ///
    /// Never fails and never panics into the caller: events that cannot be normalized,
    /// HTTP events under [`HttpErrorPolicy::Suppress`], and events arriving after
    /// shutdown are dropped with a debug log. Re-entrant calls on the same thread (a
    /// panic raised while an event is being captured) are dropped as well.
    pub fn handle_error(&self, raw: RawErrorEvent) {
        if let Some(record) = normalize_guarded(&self.inner.normalizer, raw) {
            if self
                .inner
                .commands
                .send(SchedulerCommand::Enqueue(record))
                .is_err()
            {
                debug!(app_id = %self.inner.app_id, "monitor stopped; error record dropped");
            }
        }
    }

    /// Queues `raw` unnormalized; the scheduler task normalizes it later.
    ///
    /// Used from the panic hook, where running a trace computer that may itself panic
    /// would abort the process.
    pub(crate) fn defer_error(&self, raw: RawErrorEvent) {
        if CAPTURING.with(Cell::get) {
            return;
        }
        if self
            .inner
            .commands
            .send(SchedulerCommand::Capture(raw))
            .is_err()
        {
            debug!(app_id = %self.inner.app_id, "monitor stopped; panic event dropped");
        }
    }

    /// Captures a Rust error value: its message, type, source chain and a fresh backtrace.
    pub fn handle_new_error<E>(&self, error: &E)
    where
        E: StdError + ?Sized,
    {
        let causes: Vec<String> = iter::successors(error.source(), |&cause| cause.source())
            .map(ToString::to_string)
            .collect();

        let mut raw = RawErrorEvent::new(error.to_string()).with_name(type_name::<E>());
        if !causes.is_empty() {
            raw = raw.with_property("causes", causes);
        }
        if let Some(stack) = capture::captured_backtrace() {
            raw = raw.with_stack(stack);
        }
        self.handle_error(raw);
    }

    /// Wraps `previous` so framework exceptions reach both it and this monitor.
    pub fn chain_exception_sink(
        &self,
        previous: Option<Arc<dyn ExceptionSink>>,
    ) -> ChainedExceptionSink {
        ChainedExceptionSink::new(previous, self.clone())
    }

    /// App-ready lifecycle hook: resolves the environment profile, then identifies the
    /// session. Runs in the background; capture and flushing never wait for it.
    pub fn ready(&self) -> JoinHandle<()> {
        let handle = self.clone();
        self.inner.runtime.spawn(async move {
            if let Err(err) = handle.resolve_profile().await {
                warn!(error = %err, "environment profile unavailable; keeping placeholder");
            }
            if let Err(err) = handle.identify().await {
                warn!(error = %err, "session identification failed");
            }
        })
    }

    pub async fn resolve_profile(&self) -> Result<Arc<EnvironmentProfile>, ProfileError> {
        self.inner.profile.resolve().await
    }

    /// Profile that the next flush would attach.
    pub fn profile(&self) -> Arc<EnvironmentProfile> {
        self.inner.profile.snapshot()
    }

    /// Sends the session identity to the collector, at most once per monitor.
    ///
    /// Returns `Ok(false)` when identification already ran. A failed attempt is not
    /// retried. The identity store is read on the blocking pool.
    pub async fn identify(&self) -> Result<bool, MonitorError> {
        if self.inner.identified.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let store = self.inner.identity_store.clone();
        let enduser_id =
            tokio::task::spawn_blocking(move || load_or_create_identity(store.as_ref()))
                .await
                .map_err(MonitorError::IdentityTask)??;
        let profile = self.inner.profile.snapshot();
        let payload = IdentifyPayload {
            enduser_id,
            os_version: profile.os_version.clone(),
            device: profile.model.clone(),
            platform: profile.platform.clone(),
            user_agent: profile.user_agent.clone(),
        };
        self.inner.transport.identify(&payload).await?;
        debug!(app_id = %self.inner.app_id, "session identified");
        Ok(true)
    }

    /// Flushes the current window now. Returns how many records were handed to the
    /// transport; an empty window sends nothing.
    pub async fn flush(&self) -> Result<usize, MonitorError> {
        let (ack, reply) = oneshot::channel();
        self.inner
            .commands
            .send(SchedulerCommand::Flush(ack))
            .map_err(|_| MonitorError::Stopped)?;
        reply.await.map_err(|_| MonitorError::Stopped)
    }

    pub async fn stats(&self) -> Result<SchedulerStats, MonitorError> {
        let (reply_to, reply) = oneshot::channel();
        self.inner
            .commands
            .send(SchedulerCommand::Stats(reply_to))
            .map_err(|_| MonitorError::Stopped)?;
        reply.await.map_err(|_| MonitorError::Stopped)
    }
}

/// Runs `normalizer` with panics contained and same-thread re-entry refused.
///
/// `None` covers suppressed events as well as events dropped because normalization
/// failed, panicked or was re-entered.
pub(crate) fn normalize_guarded(
    normalizer: &Normalizer,
    raw: RawErrorEvent,
) -> Option<ErrorRecord> {
    if CAPTURING.with(|flag| flag.replace(true)) {
        return None;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| normalizer.normalize(raw)));
    CAPTURING.with(|flag| flag.set(false));
    match outcome {
        Ok(Ok(record)) => record,
        Ok(Err(err)) => {
            debug!(error = %err, "error record dropped during normalization");
            None
        }
        Err(_) => {
            debug!("normalization panicked; error record dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests;
