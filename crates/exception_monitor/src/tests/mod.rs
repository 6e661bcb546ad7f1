use super::*;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

mod support;
use support::*;
