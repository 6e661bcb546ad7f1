use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::StackFrame;

/// Keys owned by [`ErrorRecord`]; raw properties using them are discarded so the
/// flattened map can never shadow a typed field.
pub const RESERVED_KEYS: &[&str] = &[
    "message",
    "name",
    "stack",
    "isHttp",
    "timestamp",
    "url",
    "headers",
];

/// Normalized, fully owned error report ready for batching and transmission.
///
/// `stack` keeps exactly the order the trace computer produced. For std backtraces that
/// is innermost call first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub stack: Vec<StackFrame>,
    pub is_http: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}
