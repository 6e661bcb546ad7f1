use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard, OnceLock,
};

use super::*;

fn env_mutex() -> &'static Mutex<()> {
    static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_MUTEX.get_or_init(|| Mutex::new(()))
}

pub(super) fn env_guard() -> MutexGuard<'static, ()> {
    env_mutex().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Records every payload it is asked to deliver; optionally fails each delivery.
#[derive(Default)]
pub(super) struct RecordingTransport {
    batches: Mutex<Vec<TransmissionPayload>>,
    identities: Mutex<Vec<IdentifyPayload>>,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn failing() -> Arc<Self> {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub(super) fn batches(&self) -> Vec<TransmissionPayload> {
        self.batches.lock().unwrap().clone()
    }

    pub(super) fn identities(&self) -> Vec<IdentifyPayload> {
        self.identities.lock().unwrap().clone()
    }

    fn outcome(&self, endpoint: &str) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, payload: &TransmissionPayload) -> Result<(), TransportError> {
        self.batches.lock().unwrap().push(payload.clone());
        self.outcome("recording://exceptions")
    }

    async fn identify(&self, payload: &IdentifyPayload) -> Result<(), TransportError> {
        self.identities.lock().unwrap().push(payload.clone());
        self.outcome("recording://u")
    }
}

pub(super) struct FixedBridge {
    pub(super) reject: bool,
}

#[async_trait]
impl NativeBridge for FixedBridge {
    async fn device_info(&self) -> Result<DeviceInfo, String> {
        if self.reject {
            return Err("device plugin rejected the request".to_string());
        }
        Ok(device())
    }
}

pub(super) fn browser() -> BrowserInfo {
    BrowserInfo {
        product: Some("rust".to_string()),
        app_version: Some("1.4.2".to_string()),
        user_agent: Some("checkout/1.4.2 (linux; x86_64)".to_string()),
        platform: Some("linux-x86_64".to_string()),
        language: Some("de-DE".to_string()),
        app_name: Some("checkout".to_string()),
        app_code_name: Some("checkout".to_string()),
        viewport_width: None,
        viewport_height: None,
        utc_offset: Some(120),
    }
}

pub(super) fn device() -> DeviceInfo {
    DeviceInfo {
        model: Some("iPhone15,2".to_string()),
        platform: Some("iOS".to_string()),
        uuid: Some("0b9c6a8e".to_string()),
        os_version: Some("17.4".to_string()),
        serial: None,
        manufacturer: Some("Apple".to_string()),
    }
}

pub(super) fn builder(transport: Arc<RecordingTransport>) -> MonitorBuilder {
    Monitor::builder()
        .app_id("app-123")
        .framework(Framework::Angular1)
        .browser(browser())
        .transport(transport)
}

/// Lets the scheduler and any spawned deliveries run to completion.
pub(super) async fn settle(handle: &MonitorHandle) {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    let _ = handle.stats().await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

pub(super) fn messages(payload: &TransmissionPayload) -> Vec<&str> {
    payload
        .errors
        .iter()
        .map(|record| record.message.as_str())
        .collect()
}
