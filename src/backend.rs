//! The discovery backend client: the trait the core calls against, plus a
//! concrete `reqwest`-based implementation.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::device::Device;
use crate::entry::SearchDeviceQuery;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned malformed payload: {0}")]
    Decode(String),
}

/// Executes device-search queries against the discovery backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn search_device(&self, query: &SearchDeviceQuery) -> Result<Vec<Device>, BackendError>;
}

/// Authentication mode for the backend: basic auth (`username`/`password`)
/// or an API key.
enum Auth {
    Basic { user: String, password: String },
    ApiKey(String),
    None,
}

/// `reqwest`-backed client for a Netdisco-shaped discovery backend.
pub struct NetdiscoClient {
    http: reqwest::Client,
    endpoint: String,
    auth: Auth,
}

impl NetdiscoClient {
    pub fn new(cfg: &BackendConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(cfg.insecure_skip_verify)
            .build()?;

        let auth = if !cfg.api_key.is_empty() {
            Auth::ApiKey(cfg.api_key.clone())
        } else if !cfg.username.is_empty() {
            Auth::Basic {
                user: cfg.username.clone(),
                password: cfg.password.clone(),
            }
        } else {
            Auth::None
        };

        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn query_pairs(query: &SearchDeviceQuery) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, val: &str| {
            if !val.is_empty() {
                pairs.push((key, val.to_string()));
            }
        };
        push("q", &query.q);
        push("dns", &query.dns);
        push("model", &query.model);
        push("vendor", &query.vendor);
        push("location", &query.location);
        push("layers", &query.layers);
        push("os", &query.os);
        push("os_ver", &query.os_ver);
        push("serial", &query.serial);
        if query.matchall {
            pairs.push(("matchall", "true".to_string()));
        }
        pairs
    }
}

#[async_trait]
impl BackendClient for NetdiscoClient {
    async fn search_device(&self, query: &SearchDeviceQuery) -> Result<Vec<Device>, BackendError> {
        let url = format!("{}/api/v1/device", self.endpoint);
        let mut req = self.http.get(&url).query(&Self::query_pairs(query));

        req = match &self.auth {
            Auth::Basic { user, password } => req.basic_auth(user, Some(password)),
            Auth::ApiKey(key) => req.header("Authorization", format!("Bearer {key}")),
            Auth::None => req,
        };

        let resp = req.send().await?.error_for_status()?;
        let devices: Vec<Device> = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(devices)
    }
}

/// In-memory stand-in used by tests: returns devices keyed by whichever
/// query field is non-empty (first match wins), or all devices for an
/// empty/`"%"`-only query.
#[derive(Default, Clone)]
pub struct FakeBackendClient {
    pub devices: Vec<Device>,
}

impl FakeBackendClient {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl BackendClient for FakeBackendClient {
    async fn search_device(&self, query: &SearchDeviceQuery) -> Result<Vec<Device>, BackendError> {
        if !query.dns.is_empty() {
            return Ok(self
                .devices
                .iter()
                .filter(|d| d.dns == query.dns)
                .cloned()
                .collect());
        }
        Ok(self.devices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_skip_empty_fields() {
        let q = SearchDeviceQuery {
            vendor: "cisco".to_string(),
            ..Default::default()
        };
        let pairs = NetdiscoClient::query_pairs(&q);
        assert_eq!(pairs, vec![("vendor", "cisco".to_string())]);
    }

    #[tokio::test]
    async fn fake_backend_filters_by_dns() {
        let devices = vec![
            Device {
                dns: "a.example".to_string(),
                ip: "10.0.0.1".to_string(),
                ..crate::device::empty_for_tests()
            },
            Device {
                dns: "b.example".to_string(),
                ip: "10.0.0.2".to_string(),
                ..crate::device::empty_for_tests()
            },
        ];
        let client = FakeBackendClient::new(devices);
        let q = SearchDeviceQuery {
            dns: "a.example".to_string(),
            ..Default::default()
        };
        let got = client.search_device(&q).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ip, "10.0.0.1");
    }
}
