use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use crate::{
    sanitize, ErrorRecord, NormalizeError, RawErrorEvent, TextTraceComputer, TraceComputer,
    RESERVED_KEYS,
};

/// What to do with errors that originate from the HTTP layer (see [`RawErrorEvent::is_http`]).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HttpErrorPolicy {
    /// Drop HTTP errors entirely; only application bugs reach the queue.
    Suppress,
    /// Keep HTTP errors and mark them with `isHttp = true`.
    #[default]
    Flag,
}

/// Turns raw capture payloads into serializable, timestamped [`ErrorRecord`]s.
#[derive(Clone)]
pub struct Normalizer {
    policy: HttpErrorPolicy,
    trace: Arc<dyn TraceComputer>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(HttpErrorPolicy::default())
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(policy: HttpErrorPolicy) -> Self {
        Self {
            policy,
            trace: Arc::new(TextTraceComputer::new()),
        }
    }

    /// Replaces the default text backtrace parser.
    pub fn with_trace_computer(mut self, trace: Arc<dyn TraceComputer>) -> Self {
        self.trace = trace;
        self
    }

    pub fn policy(&self) -> HttpErrorPolicy {
        self.policy
    }

    /// Normalizes `raw`.
    ///
    /// Returns `Ok(None)` when the policy suppresses the event. Frames supplied by the
    /// adapter take precedence over the trace computer; either way every frame is
    /// sanitized before the record is returned. A stack the trace computer rejects
    /// leaves the record with no frames and the reason under `traceError`.
    pub fn normalize(
        &self,
        mut raw: RawErrorEvent,
    ) -> Result<Option<ErrorRecord>, NormalizeError> {
        if raw.is_empty() {
            return Err(NormalizeError::EmptyEvent);
        }

        let is_http = raw.is_http();
        if is_http && self.policy == HttpErrorPolicy::Suppress {
            debug!(url = raw.url.as_deref(), "suppressing HTTP-layer error");
            return Ok(None);
        }

        let mut trace_error = None;
        let mut stack = match raw.frames.take() {
            Some(frames) => frames,
            None => self.trace.compute(&raw).unwrap_or_else(|err| {
                debug!(error = %err, "keeping error record without stack frames");
                trace_error = Some(err.to_string());
                Vec::new()
            }),
        };
        let dropped = sanitize(&mut stack);
        if dropped > 0 {
            debug!(dropped, "removed debug context from stack frames");
        }

        let RawErrorEvent {
            message,
            name,
            url,
            headers,
            mut properties,
            ..
        } = raw;
        properties.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        if let Some(reason) = trace_error {
            properties.insert("traceError".to_string(), reason.into());
        }

        Ok(Some(ErrorRecord {
            message,
            name,
            stack,
            is_http,
            timestamp: OffsetDateTime::now_utc(),
            url,
            headers,
            properties,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DebugContext, StackFrame, TraceError};
    use serde_json::json;

    struct FailingTrace;

    impl TraceComputer for FailingTrace {
        fn compute(&self, _raw: &RawErrorEvent) -> Result<Vec<StackFrame>, TraceError> {
            Err(TraceError::Unparseable {
                reason: "corrupt".to_string(),
            })
        }
    }

    fn http_error() -> RawErrorEvent {
        RawErrorEvent::new("Service Unavailable")
            .with_url("https://api.example.test/v1/items")
            .with_header("retry-after", "30")
            .with_property("status", 503)
    }

    #[test]
    fn flag_policy_keeps_http_errors_and_marks_them() {
        let record = Normalizer::new(HttpErrorPolicy::Flag)
            .normalize(http_error())
            .unwrap()
            .expect("flagged record");
        assert!(record.is_http);
        assert_eq!(record.properties["status"], json!(503));
        assert_eq!(record.url.as_deref(), Some("https://api.example.test/v1/items"));
    }

    #[test]
    fn suppress_policy_drops_http_errors() {
        let out = Normalizer::new(HttpErrorPolicy::Suppress)
            .normalize(http_error())
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn suppress_policy_keeps_application_errors() {
        let record = Normalizer::new(HttpErrorPolicy::Suppress)
            .normalize(RawErrorEvent::new("index out of bounds"))
            .unwrap()
            .unwrap();
        assert!(!record.is_http);
    }

    #[test]
    fn adapter_frames_are_sanitized() {
        let raw = RawErrorEvent::new("boom").with_frames(vec![
            StackFrame::new("a").with_debug_context(DebugContext::new([0u8; 64])),
            StackFrame::new("b"),
        ]);
        let record = Normalizer::default().normalize(raw).unwrap().unwrap();
        assert_eq!(record.stack.len(), 2);
        assert!(record.stack.iter().all(|f| !f.has_debug_context()));
    }

    #[test]
    fn textual_stack_goes_through_trace_computer() {
        let raw = RawErrorEvent::new("boom")
            .with_stack("   0: app::run\n             at src/app.rs:3:1\n   1: main");
        let record = Normalizer::default().normalize(raw).unwrap().unwrap();
        let names: Vec<_> = record
            .stack
            .iter()
            .filter_map(|f| f.function_name.as_deref())
            .collect();
        assert_eq!(names, ["app::run", "main"]);
    }

    #[test]
    fn reserved_property_keys_are_discarded() {
        let raw = RawErrorEvent::new("boom")
            .with_property("isHttp", true)
            .with_property("timestamp", "yesterday")
            .with_property("component", "checkout");
        let record = Normalizer::default().normalize(raw).unwrap().unwrap();
        assert!(!record.is_http);
        assert_eq!(record.properties.len(), 1);
        assert_eq!(record.properties["component"], json!("checkout"));
    }

    #[test]
    fn trace_failure_keeps_the_record_without_frames() {
        let normalizer = Normalizer::default().with_trace_computer(Arc::new(FailingTrace));
        let record = normalizer
            .normalize(RawErrorEvent::new("boom").with_stack("???"))
            .unwrap()
            .expect("record kept");
        assert_eq!(record.message, "boom");
        assert!(record.stack.is_empty());
        assert_eq!(
            record.properties["traceError"],
            json!("stack trace could not be parsed: corrupt")
        );
    }

    #[test]
    fn header_only_stacks_are_still_captured() {
        for header in ["TypeError: x is undefined", "Error: boom"] {
            let record = Normalizer::default()
                .normalize(RawErrorEvent::new("failed").with_stack(header))
                .unwrap()
                .expect("header-only stack kept");
            assert!(record.stack.is_empty());
            assert!(record.properties.contains_key("traceError"));
        }
    }

    #[test]
    fn empty_event_is_rejected() {
        let err = Normalizer::default()
            .normalize(RawErrorEvent::default())
            .unwrap_err();
        assert_eq!(err, NormalizeError::EmptyEvent);
    }

    #[test]
    fn records_are_stamped_with_current_time() {
        let before = OffsetDateTime::now_utc();
        let record = Normalizer::default()
            .normalize(RawErrorEvent::new("boom"))
            .unwrap()
            .unwrap();
        let after = OffsetDateTime::now_utc();
        assert!(record.timestamp >= before && record.timestamp <= after);
    }
}
