//! Entry configuration: a named binding from a virtual domain to one or
//! more backend search queries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::device::Device;
use crate::route::Route;

/// One backend query, as configured under an entry's `targets` list.
/// Every field is a server-side filter the backend understands natively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDeviceQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub matchall: bool,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub layers: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_ver: String,
    #[serde(default)]
    pub serial: String,
}

/// An immutable, operator-defined binding from a virtual DNS domain to one
/// or more backend search targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub domain: String,
    pub targets: Vec<SearchDeviceQuery>,
    #[serde(default)]
    pub routing: Option<RoutingTemplate>,
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

fn default_enable_metrics() -> bool {
    true
}

pub type Entries = Vec<Entry>;

/// Domain must be non-empty, at least one target must be configured.
pub fn validate_entry(entry: &Entry) -> Result<(), String> {
    if entry.domain.is_empty() {
        return Err("domain must be set".to_string());
    }
    if entry.targets.is_empty() {
        return Err(format!(
            "entry {}: at least one target must be set",
            entry.domain
        ));
    }
    Ok(())
}

/// A route template, rendered per-device into a concrete [`Route`].
/// `scheme`, `host`, and `metadata` fields are Tera templates evaluated
/// with the device as context; `ip` is always taken from the device
/// directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTemplate {
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RoutingTemplate {
    /// Renders this template against one device: scheme defaults to
    /// "https", host defaults to the device's DNS name, ip is always the
    /// device's IP.
    pub fn render(&self, device: &Device) -> anyhow::Result<Route> {
        let mut ctx = tera::Context::new();
        ctx.insert("device", device);

        let scheme = render_field(&self.scheme, &ctx)?;
        let host = render_field(&self.host, &ctx)?;

        Ok(Route {
            scheme: if scheme.is_empty() {
                "https".to_string()
            } else {
                scheme
            },
            port: self.port,
            host: if host.is_empty() {
                device.dns.clone()
            } else {
                host
            },
            ip: device.ip.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

fn render_field(template: &str, ctx: &tera::Context) -> anyhow::Result<String> {
    if template.is_empty() {
        return Ok(String::new());
    }
    let rendered = tera::Tera::one_off(template, ctx, false)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        serde_json::from_value(serde_json::json!({
            "ip": "10.0.0.1",
            "dns": "switch1.example",
        }))
        .unwrap()
    }

    #[test]
    fn validate_rejects_empty_domain() {
        let entry = Entry {
            domain: String::new(),
            targets: vec![SearchDeviceQuery::default()],
            routing: None,
            enable_metrics: true,
        };
        assert!(validate_entry(&entry).is_err());
    }

    #[test]
    fn validate_rejects_no_targets() {
        let entry = Entry {
            domain: "switches.example".to_string(),
            targets: vec![],
            routing: None,
            enable_metrics: true,
        };
        assert!(validate_entry(&entry).is_err());
    }

    #[test]
    fn routing_defaults_scheme_and_host() {
        let tpl = RoutingTemplate {
            scheme: String::new(),
            port: 443,
            host: String::new(),
            metadata: HashMap::new(),
        };
        let route = tpl.render(&device()).unwrap();
        assert_eq!(route.scheme, "https");
        assert_eq!(route.host, "switch1.example");
        assert_eq!(route.ip, "10.0.0.1");
    }

    #[test]
    fn routing_templates_host_from_device() {
        let tpl = RoutingTemplate {
            scheme: "http".to_string(),
            port: 80,
            host: "{{ device.name }}.internal".to_string(),
            metadata: HashMap::new(),
        };
        let mut d = device();
        d.name = "sw1".to_string();
        let route = tpl.render(&d).unwrap();
        assert_eq!(route.host, "sw1.internal");
        assert_eq!(route.scheme, "http");
    }
}
