//! Environment profile attached to every transmitted batch.
//!
//! A profile is merged from tagged [`ProfileSource`]s. Native device data wins over
//! host-derived ("browser") data for keys both provide; host data fills whatever the
//! native bridge left out.

use std::{env, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::ProfileError;

/// Host-derived descriptive fields, always available.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub product: Option<String>,
    pub app_version: Option<String>,
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub language: Option<String>,
    pub app_name: Option<String>,
    pub app_code_name: Option<String>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    /// Offset from UTC in minutes.
    pub utc_offset: Option<i32>,
}

impl BrowserInfo {
    /// Best-effort description of the current process and host.
    pub fn detect() -> Self {
        let os = env::consts::OS;
        let arch = env::consts::ARCH;
        let app_name = env::current_exe()
            .ok()
            .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()));
        let language = ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
            .map(|value| value.split('.').next().unwrap_or(&value).replace('_', "-"));
        let utc_offset = time::UtcOffset::current_local_offset()
            .ok()
            .map(|offset| offset.whole_minutes() as i32);
        let viewport = |key: &str| env::var(key).ok().and_then(|v| v.trim().parse().ok());

        Self {
            product: Some("rust".to_string()),
            app_version: None,
            user_agent: Some(format!(
                "{}/{} ({os}; {arch})",
                app_name.as_deref().unwrap_or("unknown"),
                env!("CARGO_PKG_VERSION"),
            )),
            platform: Some(format!("{os}-{arch}")),
            language,
            app_code_name: app_name.clone(),
            app_name,
            viewport_width: viewport("COLUMNS"),
            viewport_height: viewport("LINES"),
            utc_offset,
        }
    }
}

/// Fields only a native device bridge can supply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub model: Option<String>,
    pub platform: Option<String>,
    pub uuid: Option<String>,
    pub os_version: Option<String>,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
}

/// One contributor to an [`EnvironmentProfile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileSource {
    Native(DeviceInfo),
    Browser(BrowserInfo),
}

impl ProfileSource {
    /// Higher wins when two sources provide the same key.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Native(_) => 2,
            Self::Browser(_) => 1,
        }
    }
}

/// Merged device/host/app description sent as `device` in every payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_code_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_version: Option<String>,
}

impl EnvironmentProfile {
    /// Merges `sources` by precedence; within equal precedence the first source wins.
    pub fn merge<I>(sources: I, code_version: Option<String>) -> Self
    where
        I: IntoIterator<Item = ProfileSource>,
    {
        let mut sources: Vec<_> = sources.into_iter().collect();
        sources.sort_by_key(|source| std::cmp::Reverse(source.precedence()));

        let mut profile = Self {
            code_version,
            ..Self::default()
        };
        for source in &sources {
            profile.fill_from(source);
        }
        profile
    }

    fn fill_from(&mut self, source: &ProfileSource) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        match source {
            ProfileSource::Native(device) => {
                fill(&mut self.model, &device.model);
                fill(&mut self.platform, &device.platform);
                fill(&mut self.uuid, &device.uuid);
                fill(&mut self.os_version, &device.os_version);
                fill(&mut self.serial, &device.serial);
                fill(&mut self.manufacturer, &device.manufacturer);
            }
            ProfileSource::Browser(browser) => {
                fill(&mut self.product, &browser.product);
                fill(&mut self.app_version, &browser.app_version);
                fill(&mut self.user_agent, &browser.user_agent);
                fill(&mut self.platform, &browser.platform);
                fill(&mut self.language, &browser.language);
                fill(&mut self.app_name, &browser.app_name);
                fill(&mut self.app_code_name, &browser.app_code_name);
                fill(&mut self.viewport_width, &browser.viewport_width);
                fill(&mut self.viewport_height, &browser.viewport_height);
                fill(&mut self.utc_offset, &browser.utc_offset);
            }
        }
    }
}

/// Optional asynchronous source of native device information.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Whether the companion device-info plugin is installed. When it is not, the
    /// collector falls back to host data and never calls [`Self::device_info`].
    fn has_device_info(&self) -> bool {
        true
    }

    /// Resolves device information; `Err` carries the bridge's rejection reason.
    async fn device_info(&self) -> Result<DeviceInfo, String>;
}

/// Resolves the session's [`EnvironmentProfile`] once and caches it.
///
/// Until resolution succeeds readers observe the placeholder profile. At most one
/// resolution runs at a time; later callers wait for it and reuse the result.
pub struct ProfileCollector {
    browser: BrowserInfo,
    bridge: Option<Arc<dyn NativeBridge>>,
    code_version: Option<String>,
    current: watch::Sender<Arc<EnvironmentProfile>>,
    resolved: Mutex<bool>,
}

impl std::fmt::Debug for ProfileCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCollector")
            .field("browser", &self.browser)
            .field("has_bridge", &self.bridge.is_some())
            .field("code_version", &self.code_version)
            .finish_non_exhaustive()
    }
}

impl ProfileCollector {
    pub fn new(
        browser: BrowserInfo,
        bridge: Option<Arc<dyn NativeBridge>>,
        code_version: Option<String>,
    ) -> Self {
        let (current, _) = watch::channel(Arc::new(EnvironmentProfile::default()));
        Self {
            browser,
            bridge,
            code_version,
            current,
            resolved: Mutex::new(false),
        }
    }

    /// Latest profile: the resolved one, or the placeholder before resolution.
    pub fn snapshot(&self) -> Arc<EnvironmentProfile> {
        self.current.borrow().clone()
    }

    /// Receives every wholesale replacement of the profile.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EnvironmentProfile>> {
        self.current.subscribe()
    }

    pub async fn is_resolved(&self) -> bool {
        *self.resolved.lock().await
    }

    /// Resolves the profile, or returns the cached one when already resolved.
    ///
    /// A bridge rejection leaves the placeholder in place and returns the error; a
    /// later call may try again.
    pub async fn resolve(&self) -> Result<Arc<EnvironmentProfile>, ProfileError> {
        let mut resolved = self.resolved.lock().await;
        if *resolved {
            return Ok(self.snapshot());
        }

        let mut sources = Vec::with_capacity(2);
        match &self.bridge {
            None => debug!("no native bridge; using host profile only"),
            Some(bridge) if !bridge.has_device_info() => {
                warn!(
                    "native bridge present without device info plugin; \
                     native context and source mapping are unavailable"
                );
            }
            Some(bridge) => {
                let device = bridge
                    .device_info()
                    .await
                    .map_err(|reason| ProfileError::BridgeRejected { reason })?;
                sources.push(ProfileSource::Native(device));
            }
        }
        sources.push(ProfileSource::Browser(self.browser.clone()));

        let profile = Arc::new(EnvironmentProfile::merge(
            sources,
            self.code_version.clone(),
        ));
        self.current.send_replace(profile.clone());
        *resolved = true;
        Ok(profile)
    }
}
