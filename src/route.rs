//! Route records derived from entries with a routing template, and format
//! adapters for downstream reverse proxies.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub scheme: String,
    pub port: u16,
    pub host: String,
    pub ip: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Route {
    fn url(&self) -> String {
        if self.port > 0 {
            format!("{}://{}:{}", self.scheme, self.ip, self.port)
        } else {
            format!("{}://{}", self.scheme, self.ip)
        }
    }
}

/// Converts a set of routes into a downstream-proxy-specific configuration
/// document.
pub trait RouteFormatter {
    fn convert(&self, routes: &[Route]) -> serde_json::Value;
}

/// Default formatter: routes pass through unchanged.
pub struct IdentityFormatter;

impl RouteFormatter for IdentityFormatter {
    fn convert(&self, routes: &[Route]) -> serde_json::Value {
        serde_json::to_value(routes).unwrap_or(serde_json::Value::Null)
    }
}

/// Traefik dynamic configuration formatter for the `/routes?format=traefik`
/// path.
pub struct TraefikFormatter;

impl RouteFormatter for TraefikFormatter {
    fn convert(&self, routes: &[Route]) -> serde_json::Value {
        let mut routers = serde_json::Map::new();
        let mut services = serde_json::Map::new();

        for route in routes {
            let name = route.host.replace('.', "-");

            let entry_points = route
                .metadata
                .get("entryPoints")
                .cloned()
                .unwrap_or_else(|| serde_json::json!(["http"]));

            routers.insert(
                name.clone(),
                serde_json::json!({
                    "entryPoints": entry_points,
                    "service": name,
                    "rule": format!("Host(`{}`)", route.host),
                }),
            );
            services.insert(
                name,
                serde_json::json!({
                    "loadBalancer": {
                        "servers": [{ "url": route.url() }]
                    }
                }),
            );
        }

        serde_json::json!({
            "http": {
                "routers": routers,
                "services": services,
            }
        })
    }
}

/// Resolves a `format` query parameter to a formatter.
pub fn formatter_for(format: Option<&str>) -> Box<dyn RouteFormatter + Send + Sync> {
    match format {
        Some("traefik") => Box::new(TraefikFormatter),
        _ => Box::new(IdentityFormatter),
    }
}
