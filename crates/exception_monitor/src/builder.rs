use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use exception_events::{HttpErrorPolicy, Normalizer, TraceComputer};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::debug;

use crate::{
    defaults::{
        env_api_base, env_app_id, env_dev_mode, DEFAULT_DEV_API_BASE, DEFAULT_FLUSH_DELAY,
    },
    scheduler::FlushScheduler,
    BrowserInfo, FileIdentityStore, Framework, HttpTransport, IdentityStore, Inner,
    MemoryIdentityStore, Monitor, MonitorError, MonitorHandle, NativeBridge, ProfileCollector,
    Transport,
};

/// Which collector endpoint a monitor talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Posts to the local development collector (`dev_api_base`).
    Development,
    /// Posts to the configured `api_base`.
    #[default]
    Production,
}

/// Configures and starts a [`Monitor`].
pub struct MonitorBuilder {
    app_id: String,
    mode: Mode,
    api_base: Option<String>,
    dev_api_base: String,
    flush_delay: Duration,
    http_policy: HttpErrorPolicy,
    framework: Framework,
    code_version: Option<String>,
    browser: Option<BrowserInfo>,
    native_bridge: Option<Arc<dyn NativeBridge>>,
    identity_store: Option<Arc<dyn IdentityStore>>,
    transport: Option<Arc<dyn Transport>>,
    trace_computer: Option<Arc<dyn TraceComputer>>,
    request_timeout: Option<Duration>,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            mode: Mode::default(),
            api_base: None,
            dev_api_base: DEFAULT_DEV_API_BASE.to_string(),
            flush_delay: DEFAULT_FLUSH_DELAY,
            http_policy: HttpErrorPolicy::default(),
            framework: Framework::default(),
            code_version: None,
            browser: None,
            native_bridge: None,
            identity_store: None,
            transport: None,
            trace_computer: None,
            request_timeout: None,
        }
    }
}

impl std::fmt::Debug for MonitorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorBuilder")
            .field("app_id", &self.app_id)
            .field("mode", &self.mode)
            .field("api_base", &self.api_base)
            .field("dev_api_base", &self.dev_api_base)
            .field("flush_delay", &self.flush_delay)
            .field("http_policy", &self.http_policy)
            .field("framework", &self.framework)
            .field("code_version", &self.code_version)
            .field("has_native_bridge", &self.native_bridge.is_some())
            .field("has_identity_store", &self.identity_store.is_some())
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl MonitorBuilder {
    /// Starts a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from `EXCEPTION_MONITOR_APP_ID`, `EXCEPTION_MONITOR_API_BASE`
    /// and `EXCEPTION_MONITOR_DEV`. Unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut builder = Self::default();
        if let Some(app_id) = env_app_id() {
            builder.app_id = app_id;
        }
        builder.api_base = env_api_base();
        if env_dev_mode() {
            builder.mode = Mode::Development;
        }
        builder
    }

    /// Sets the application id used in every endpoint path and payload.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the production collector base, e.g. `https://collector.example.com`.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Overrides the development collector base (defaults to `http://localhost:8000`).
    pub fn dev_api_base(mut self, base: impl Into<String>) -> Self {
        self.dev_api_base = base.into();
        self
    }

    /// Sets the flush window length. Defaults to 2 seconds.
    pub fn flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Chooses whether HTTP-originated errors are flagged or dropped.
    pub fn http_policy(mut self, policy: HttpErrorPolicy) -> Self {
        self.http_policy = policy;
        self
    }

    pub fn framework(mut self, framework: impl Into<Framework>) -> Self {
        self.framework = framework.into();
        self
    }

    /// Application build identifier attached to the environment profile.
    pub fn code_version(mut self, version: impl Into<String>) -> Self {
        self.code_version = Some(version.into());
        self
    }

    /// Replaces the host information detected from the process environment.
    pub fn browser(mut self, browser: BrowserInfo) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn native_bridge(mut self, bridge: Arc<dyn NativeBridge>) -> Self {
        self.native_bridge = Some(bridge);
        self
    }

    /// Where the session identity is persisted. Without a store the identity lives only
    /// as long as the process.
    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity_store = Some(store);
        self
    }

    /// Persists the session identity as a file inside `dir`.
    pub fn identity_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.identity_store(Arc::new(FileIdentityStore::new(dir)))
    }

    /// Sends batches through `transport` instead of the HTTP client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn trace_computer(mut self, trace: Arc<dyn TraceComputer>) -> Self {
        self.trace_computer = Some(trace);
        self
    }

    /// Bounds each collector request. Unbounded by default.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Collector base for the configured mode.
    pub fn resolved_api_base(&self) -> Result<&str, MonitorError> {
        match self.mode {
            Mode::Development => Ok(&self.dev_api_base),
            Mode::Production => self
                .api_base
                .as_deref()
                .filter(|base| !base.trim().is_empty())
                .ok_or(MonitorError::MissingApiBase),
        }
    }

    /// Validates the configuration and spawns the flush scheduler on the current tokio
    /// runtime.
    pub fn build(self) -> Result<Monitor, MonitorError> {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let app_id = self.app_id.trim().to_string();
        if app_id.is_empty() {
            return Err(MonitorError::EmptyAppId);
        }

        let transport: Arc<dyn Transport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => {
                let base = self.resolved_api_base()?;
                Arc::new(HttpTransport::new(base, &app_id, self.request_timeout)?)
            }
        };

        let mut normalizer = Normalizer::new(self.http_policy);
        if let Some(trace) = self.trace_computer {
            normalizer = normalizer.with_trace_computer(trace);
        }

        let profile = Arc::new(ProfileCollector::new(
            self.browser.unwrap_or_else(BrowserInfo::detect),
            self.native_bridge,
            self.code_version,
        ));

        let (commands, receiver) = mpsc::unbounded_channel();
        let scheduler = FlushScheduler::new(
            self.flush_delay,
            normalizer.clone(),
            receiver,
            transport.clone(),
            profile.clone(),
            app_id.clone(),
            self.framework,
        );
        let task = runtime.spawn(scheduler.run());
        debug!(
            app_id = %app_id,
            mode = ?self.mode,
            flush_delay_ms = self.flush_delay.as_millis() as u64,
            "exception monitor started"
        );

        let identity_store = self.identity_store.unwrap_or_else(|| {
            debug!("no identity store configured; session identity is not persisted");
            Arc::new(MemoryIdentityStore::default())
        });

        let handle = MonitorHandle::from_inner(Inner {
            app_id,
            normalizer,
            commands,
            profile,
            transport,
            identity_store,
            identified: AtomicBool::new(false),
            runtime,
        });
        Ok(Monitor::new(handle, task))
    }
}
