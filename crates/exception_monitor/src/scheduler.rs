//! Batch queue and flush scheduling.
//!
//! [`FlushWindow`] is the IDLE/ARMED state machine: the first record pushed while
//! IDLE arms a single deadline `delay` in the future; later pushes only append. The
//! deadline never moves, so a window is flushed at most `delay` after it opened no
//! matter how many records arrive. The queue is unbounded; a burst of errors grows
//! memory until the window closes.
//!
//! [`FlushScheduler`] owns one window inside a task and is driven by
//! [`SchedulerCommand`]s, so enqueue and timer expiry are serialized without
//! sharing the queue.

use std::{sync::Arc, time::Duration};

use exception_events::{ErrorRecord, Normalizer, RawErrorEvent};
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant},
};
use tracing::{debug, warn};

use crate::{normalize_guarded, Framework, ProfileCollector, TransmissionPayload, Transport};

/// Observable state of a [`FlushWindow`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowState {
    Idle,
    Armed { deadline: Instant },
}

/// Insertion-ordered batch plus its single optional flush deadline.
#[derive(Debug)]
pub struct FlushWindow {
    delay: Duration,
    queue: Vec<ErrorRecord>,
    deadline: Option<Instant>,
}

impl FlushWindow {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            queue: Vec::new(),
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Appends `record`; arms the window when idle. Returns `true` if this push armed it.
    pub fn push(&mut self, record: ErrorRecord, now: Instant) -> bool {
        self.queue.push(record);
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.delay);
        true
    }

    pub fn state(&self) -> WindowState {
        match self.deadline {
            Some(deadline) => WindowState::Armed { deadline },
            None => WindowState::Idle,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Disarms and returns the whole batch, leaving the queue empty.
    pub fn take(&mut self) -> Vec<ErrorRecord> {
        self.deadline = None;
        std::mem::take(&mut self.queue)
    }

    /// Disarms and discards the batch. Returns how many records were lost.
    pub fn cancel(&mut self) -> usize {
        self.take().len()
    }
}

/// Snapshot reported by [`crate::MonitorHandle::stats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SchedulerStats {
    pub queued: usize,
    pub armed: bool,
}

pub(crate) enum SchedulerCommand {
    Enqueue(ErrorRecord),
    /// Raw event normalized on the scheduler task.
    Capture(RawErrorEvent),
    Flush(oneshot::Sender<usize>),
    Stats(oneshot::Sender<SchedulerStats>),
    Shutdown(oneshot::Sender<usize>),
}

pub(crate) struct FlushScheduler {
    window: FlushWindow,
    normalizer: Normalizer,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    transport: Arc<dyn Transport>,
    profile: Arc<ProfileCollector>,
    app_id: String,
    framework: Framework,
}

impl FlushScheduler {
    pub(crate) fn new(
        delay: Duration,
        normalizer: Normalizer,
        commands: mpsc::UnboundedReceiver<SchedulerCommand>,
        transport: Arc<dyn Transport>,
        profile: Arc<ProfileCollector>,
        app_id: String,
        framework: Framework,
    ) -> Self {
        Self {
            window: FlushWindow::new(delay),
            normalizer,
            commands,
            transport,
            profile,
            app_id,
            framework,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self.window.deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SchedulerCommand::Enqueue(record)) => self.enqueue(record),
                    Some(SchedulerCommand::Capture(raw)) => {
                        if let Some(record) = normalize_guarded(&self.normalizer, raw) {
                            self.enqueue(record);
                        }
                    }
                    Some(SchedulerCommand::Flush(ack)) => {
                        let sent = self.flush();
                        let _ = ack.send(sent);
                    }
                    Some(SchedulerCommand::Stats(reply)) => {
                        let _ = reply.send(SchedulerStats {
                            queued: self.window.len(),
                            armed: self.window.is_armed(),
                        });
                    }
                    Some(SchedulerCommand::Shutdown(ack)) => {
                        let dropped = self.window.cancel();
                        if dropped > 0 {
                            debug!(dropped, "discarding unsent batch on shutdown");
                        }
                        let _ = ack.send(dropped);
                        break;
                    }
                    None => {
                        let dropped = self.window.cancel();
                        debug!(dropped, "all monitor handles dropped; scheduler exiting");
                        break;
                    }
                },
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.flush();
                }
            }
        }
    }

    fn enqueue(&mut self, record: ErrorRecord) {
        if self.window.push(record, Instant::now()) {
            debug!(delay_ms = self.window.delay().as_millis() as u64, "flush window armed");
        }
    }

    /// Snapshot-and-clear, then hand the batch to the transport without awaiting it.
    fn flush(&mut self) -> usize {
        let errors = self.window.take();
        if errors.is_empty() {
            return 0;
        }

        let count = errors.len();
        let payload = TransmissionPayload {
            app_id: self.app_id.clone(),
            framework: self.framework.clone(),
            device: (*self.profile.snapshot()).clone(),
            errors,
        };
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match transport.send(&payload).await {
                Ok(()) => debug!(records = payload.errors.len(), "batch transmitted"),
                Err(err) => warn!(
                    app_id = %payload.app_id,
                    records = payload.errors.len(),
                    error = %err,
                    "failed to transmit batch; records discarded"
                ),
            }
        });
        count
    }
}
