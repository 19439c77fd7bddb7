//! The device record as consumed from the backend.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A single device as reported by the discovery backend. Most fields are
/// plain strings because the backend itself treats them as opaque labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_ver: String,
    /// Binary digit string, e.g. "00000100" for layer 3.
    #[serde(default)]
    pub layers: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub location: String,
    /// Hundredths of a second, as reported by the backend.
    #[serde(default)]
    pub uptime: u64,

    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub chassis_id: String,
}

impl Device {
    /// Parses `ip`, or `None` if empty/unparseable.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        if self.ip.is_empty() {
            return None;
        }
        self.ip.parse().ok()
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.ip_addr(), Some(IpAddr::V4(_)))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.ip_addr(), Some(IpAddr::V6(_)))
    }

    /// Layers as an integer, parsed from the binary digit string.
    pub fn layers_as_u32(&self) -> u32 {
        u32::from_str_radix(&self.layers, 2).unwrap_or(0)
    }

    /// `uptime` (hundredths of a second) rendered as whole seconds, e.g. "120s".
    pub fn uptime_human(&self) -> String {
        format!("{}s", self.uptime / 100)
    }
}

#[cfg(test)]
pub(crate) fn empty_for_tests() -> Device {
    Device {
        ip: String::new(),
        dns: String::new(),
        name: String::new(),
        mac: String::new(),
        vendor: String::new(),
        model: String::new(),
        os: String::new(),
        os_ver: String::new(),
        layers: String::new(),
        serial: String::new(),
        location: String::new(),
        uptime: 0,
        description: String::new(),
        contact: String::new(),
        chassis_id: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(ip: &str) -> Device {
        Device {
            ip: ip.to_string(),
            ..empty()
        }
    }

    fn empty() -> Device {
        empty_for_tests()
    }

    #[test]
    fn ipv4_detection() {
        let d = device("10.0.0.1");
        assert!(d.is_ipv4());
        assert!(!d.is_ipv6());
    }

    #[test]
    fn ipv6_detection() {
        let d = device("2001:db8::1");
        assert!(d.is_ipv6());
        assert!(!d.is_ipv4());
    }

    #[test]
    fn empty_ip_is_neither() {
        let d = device("");
        assert!(!d.is_ipv4());
        assert!(!d.is_ipv6());
        assert_eq!(d.ip_addr(), None);
    }

    #[test]
    fn layers_parsed_as_binary() {
        let mut d = empty();
        d.layers = "00000100".to_string();
        assert_eq!(d.layers_as_u32(), 4);
    }

    #[test]
    fn uptime_converts_hundredths_to_seconds() {
        let mut d = empty();
        d.uptime = 12345;
        assert_eq!(d.uptime_human(), "123s");
    }
}
