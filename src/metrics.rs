//! Ambient observability: refresh/fallback counters and per-device info
//! gauges exposed via Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::device::Device;

/// Builds the Prometheus recorder and installs it as the global `metrics`
/// recorder, returning a handle the HTTP API can render from on scrape.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("metrics recorder already installed: {e}"))?;
    Ok(handle)
}

pub fn record_refresh_success(domain: &str, device_count: usize) {
    metrics::counter!(
        "netdisco_bridge_refresh_total",
        "domain" => domain.to_string(),
        "result" => "success",
    )
    .increment(1);
    metrics::gauge!("netdisco_bridge_entry_devices", "domain" => domain.to_string())
        .set(device_count as f64);
}

pub fn record_refresh_failure(domain: &str) {
    metrics::counter!(
        "netdisco_bridge_refresh_total",
        "domain" => domain.to_string(),
        "result" => "failure",
    )
    .increment(1);
}

pub fn record_fallback_lookup(domain: &str, result: &'static str) {
    metrics::counter!(
        "netdisco_bridge_fallback_lookup_total",
        "domain" => domain.to_string(),
        "result" => result,
    )
    .increment(1);
}

/// Per-device info gauge (vendor/model/os as labels, value fixed at 1).
pub fn record_device_info(domain: &str, device: &Device) {
    metrics::gauge!(
        "netdisco_bridge_device_info",
        "domain" => domain.to_string(),
        "ip" => device.ip.clone(),
        "vendor" => device.vendor.clone(),
        "model" => device.model.clone(),
        "os" => device.os.clone(),
    )
    .set(1.0);
}
