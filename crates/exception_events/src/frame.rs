use std::{any::Any, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Opaque, non-serializable payload a trace computer may hang off a frame
/// (symbol handles, captured locals, and similar).
///
/// It never reaches the wire: [`sanitize`] drops it and serde skips it.
#[derive(Clone)]
pub struct DebugContext(Arc<dyn Any + Send + Sync>);

impl DebugContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for DebugContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DebugContext(..)")
    }
}

impl PartialEq for DebugContext {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

/// One frame of a computed stack trace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub column_number: Option<u32>,
    #[serde(skip)]
    pub debug_context: Option<DebugContext>,
}

impl StackFrame {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: Some(function_name.into()),
            ..Self::default()
        }
    }

    pub fn at(mut self, file_name: impl Into<String>, line: u32, column: Option<u32>) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = Some(line);
        self.column_number = column;
        self
    }

    pub fn with_debug_context(mut self, context: DebugContext) -> Self {
        self.debug_context = Some(context);
        self
    }

    pub fn has_debug_context(&self) -> bool {
        self.debug_context.is_some()
    }
}

/// Drops the debug context of every frame, releasing whatever it retained.
///
/// Returns how many contexts were removed; a second pass always returns zero.
pub fn sanitize(frames: &mut [StackFrame]) -> usize {
    frames
        .iter_mut()
        .filter_map(|frame| frame.debug_context.take())
        .count()
}
