//! Structured configuration document, loaded from TOML. `Deserialize`
//! structs with `#[serde(default = "...")]` defaults.

use serde::Deserialize;

use crate::entry::Entries;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub entries: Entries,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub dns_server: DnsServerConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub disable_reports_metrics: bool,
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("could not read config {path}: {e}"))?;
        let cfg: Self = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fatal-at-startup validation: configuration errors abort the
    /// process before it serves anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend.endpoint.is_empty() {
            anyhow::bail!("backend.endpoint must be set");
        }
        if self.entries.is_empty() {
            anyhow::bail!("you must set at least one entry");
        }
        for entry in &self.entries {
            crate::entry::validate_entry(entry).map_err(|e| anyhow::anyhow!(e))?;
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.entries {
            if !seen.insert(&entry.domain) {
                anyhow::bail!("duplicate entry domain: {}", entry.domain);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub endpoint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_nb_workers() -> usize {
    5
}

fn default_refresh_interval_secs() -> u64 {
    25 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_nb_workers")]
    pub nb_workers: usize,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            nb_workers: default_nb_workers(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl WorkersConfig {
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

fn default_dns_listen() -> String {
    "0.0.0.0:53".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsServerConfig {
    #[serde(default)]
    pub disable: bool,
    #[serde(default = "default_dns_listen")]
    pub listen: String,
}

impl Default for DnsServerConfig {
    fn default() -> Self {
        Self {
            disable: false,
            listen: default_dns_listen(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub listen: String,
    #[serde(default)]
    pub enable_ssl: bool,
    #[serde(default)]
    pub tls_pem: TlsPem,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            disable: false,
            listen: String::new(),
            enable_ssl: false,
            tls_pem: TlsPem::default(),
        }
    }
}

impl HttpServerConfig {
    /// Resolves the effective listen address: `:8080` plain, `:8443` TLS,
    /// unless explicitly set.
    pub fn listen_addr(&self) -> String {
        if !self.listen.is_empty() {
            return self.listen.clone();
        }
        if self.enable_ssl {
            "0.0.0.0:8443".to_string()
        } else {
            "0.0.0.0:8080".to_string()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsPem {
    #[serde(default)]
    pub cert_chain: String,
    #[serde(default)]
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub no_color: bool,
    #[serde(default)]
    pub in_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            no_color: false,
            in_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, SearchDeviceQuery};

    fn minimal_entry() -> Entry {
        Entry {
            domain: "switches.example".to_string(),
            targets: vec![SearchDeviceQuery::default()],
            routing: None,
            enable_metrics: true,
        }
    }

    fn base_backend() -> BackendConfig {
        BackendConfig {
            endpoint: "http://netdisco.internal".to_string(),
            username: String::new(),
            password: String::new(),
            api_key: String::new(),
            insecure_skip_verify: false,
        }
    }

    #[test]
    fn validate_requires_backend_endpoint() {
        let mut backend = base_backend();
        backend.endpoint = String::new();
        let cfg = AppConfig {
            backend,
            entries: vec![minimal_entry()],
            workers: WorkersConfig::default(),
            dns_server: DnsServerConfig::default(),
            http_server: HttpServerConfig::default(),
            log: LogConfig::default(),
            disable_reports_metrics: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_at_least_one_entry() {
        let cfg = AppConfig {
            backend: base_backend(),
            entries: vec![],
            workers: WorkersConfig::default(),
            dns_server: DnsServerConfig::default(),
            http_server: HttpServerConfig::default(),
            log: LogConfig::default(),
            disable_reports_metrics: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_domains() {
        let mut cfg = AppConfig {
            backend: base_backend(),
            entries: vec![minimal_entry(), minimal_entry()],
            workers: WorkersConfig::default(),
            dns_server: DnsServerConfig::default(),
            http_server: HttpServerConfig::default(),
            log: LogConfig::default(),
            disable_reports_metrics: false,
        };
        assert!(cfg.validate().is_err());
        cfg.entries[1].domain = "other.example".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn http_listen_addr_defaults_by_tls() {
        let mut http = HttpServerConfig::default();
        assert_eq!(http.listen_addr(), "0.0.0.0:8080");
        http.enable_ssl = true;
        assert_eq!(http.listen_addr(), "0.0.0.0:8443");
    }
}
