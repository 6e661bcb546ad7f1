use thiserror::Error;

/// Failure reported by a [`crate::TraceComputer`].
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TraceError {
    #[error("stack trace could not be parsed: {reason}")]
    Unparseable { reason: String },
}

/// Reasons a raw event could not become an [`crate::ErrorRecord`].
///
/// Callers on the capture path treat every variant as "drop this record".
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NormalizeError {
    #[error("raw error event carries no message, stack, or properties")]
    EmptyEvent,
}
