use std::{env, time::Duration};

pub(crate) const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(2000);
pub(crate) const DEFAULT_DEV_API_BASE: &str = "http://localhost:8000";
pub(crate) const APP_ID_ENV: &str = "EXCEPTION_MONITOR_APP_ID";
pub(crate) const API_BASE_ENV: &str = "EXCEPTION_MONITOR_API_BASE";
pub(crate) const DEV_MODE_ENV: &str = "EXCEPTION_MONITOR_DEV";

/// Storage key of the persisted session identity.
pub const IDENTITY_KEY: &str = "exception_monitor_enduser_id";

pub(crate) fn env_app_id() -> Option<String> {
    env::var(APP_ID_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_api_base() -> Option<String> {
    env::var(API_BASE_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_dev_mode() -> bool {
    env::var(DEV_MODE_ENV)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub(crate) fn exceptions_url(base: &str, app_id: &str) -> String {
    format!("{}/monitoring/{app_id}/exceptions", base.trim_end_matches('/'))
}

pub(crate) fn identify_url(base: &str, app_id: &str) -> String {
    format!("{}/monitoring/{app_id}/u", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_trim_trailing_slashes() {
        assert_eq!(
            exceptions_url("https://collector.test/", "a1b2"),
            "https://collector.test/monitoring/a1b2/exceptions"
        );
        assert_eq!(
            identify_url("http://localhost:8000", "a1b2"),
            "http://localhost:8000/monitoring/a1b2/u"
        );
    }
}
