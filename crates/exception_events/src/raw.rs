use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::StackFrame;

/// Error payload as handed over by a capture adapter.
///
/// Frames supplied here may still carry [`crate::DebugContext`], so the event
/// itself is not serializable; [`crate::Normalizer::normalize`] produces the
/// wire-safe [`crate::ErrorRecord`].
#[derive(Clone, Debug, Default)]
pub struct RawErrorEvent {
    pub message: String,
    /// Type name of the originating error, when known.
    pub name: Option<String>,
    /// Textual stack representation (backtrace display output).
    pub stack: Option<String>,
    /// Frames computed by the adapter; when present the trace computer is skipped.
    pub frames: Option<Vec<StackFrame>>,
    pub url: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    /// Any other top-level properties of the originating error.
    pub properties: Map<String, Value>,
}

impl RawErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// HTTP-layer errors are recognized by a non-empty `url` or any `headers` map.
    pub fn is_http(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty()) || self.headers.is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
            && self.stack.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.frames.as_ref().map_or(true, Vec::is_empty)
            && self.properties.is_empty()
            && !self.is_http()
    }
}
