use std::{fmt, time::Duration};

use async_trait::async_trait;
use exception_events::ErrorRecord;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, error};

use crate::{
    defaults::{exceptions_url, identify_url},
    EnvironmentProfile, IdentifyPayload, MonitorError, TransportError,
};

/// Host framework tag reported with every batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Framework {
    Angular1,
    Angular2,
    #[default]
    Unset,
    Other(String),
}

impl Framework {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Angular1 => "angular1",
            Self::Angular2 => "angular2",
            Self::Unset => "none",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for Framework {
    fn from(value: &str) -> Self {
        match value {
            "angular1" => Self::Angular1,
            "angular2" => Self::Angular2,
            "none" | "" => Self::Unset,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Framework {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// Body of one flush POST.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransmissionPayload {
    pub app_id: String,
    pub framework: Framework,
    pub device: EnvironmentProfile,
    pub errors: Vec<ErrorRecord>,
}

/// Delivers payloads to the collector.
///
/// Callers never retry and never await delivery on the capture path; an `Err` is only
/// logged.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &TransmissionPayload) -> Result<(), TransportError>;

    async fn identify(&self, payload: &IdentifyPayload) -> Result<(), TransportError>;
}

/// JSON-over-HTTP transport posting to `<base>/monitoring/<app_id>/...`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    exceptions_url: String,
    identify_url: String,
}

impl HttpTransport {
    /// Builds a transport for `app_id` against `base`.
    ///
    /// No request timeout is enforced unless `timeout` is given.
    pub fn new(
        base: &str,
        app_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, MonitorError> {
        reqwest::Url::parse(base).map_err(|err| MonitorError::InvalidApiBase {
            url: base.to_string(),
            reason: err.to_string(),
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(MonitorError::HttpClient)?;

        Ok(Self {
            client,
            exceptions_url: exceptions_url(base, app_id),
            identify_url: identify_url(base, app_id),
        })
    }

    pub fn exceptions_url(&self) -> &str {
        &self.exceptions_url
    }

    pub fn identify_url(&self) -> &str {
        &self.identify_url
    }

    async fn post_json<T: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(endpoint, status = status.as_u16(), "collector accepted payload");
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &TransmissionPayload) -> Result<(), TransportError> {
        self.post_json(&self.exceptions_url, payload).await
    }

    async fn identify(&self, payload: &IdentifyPayload) -> Result<(), TransportError> {
        self.post_json(&self.identify_url, payload).await
    }
}

/// Writes each serialized batch to the diagnostic log instead of the network.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiagnosticTransport;

#[async_trait]
impl Transport for DiagnosticTransport {
    async fn send(&self, payload: &TransmissionPayload) -> Result<(), TransportError> {
        let body = serde_json::to_string(&payload.errors)?;
        error!(
            app_id = %payload.app_id,
            records = payload.errors.len(),
            "{body}"
        );
        Ok(())
    }

    async fn identify(&self, payload: &IdentifyPayload) -> Result<(), TransportError> {
        debug!(enduser_id = %payload.enduser_id, "identify skipped by diagnostic transport");
        Ok(())
    }
}
