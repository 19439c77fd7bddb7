//! Search Compiler: translates a multi-field device predicate into a
//! backend query plus an optional local post-filter.

use serde::Deserialize;

use crate::backend::BackendClient;
use crate::backend::BackendError;
use crate::device::Device;
use crate::entry::SearchDeviceQuery;

/// A multi-field predicate for the HTTP search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub host_match: String,
    #[serde(default)]
    pub manufacturer_name: String,
    #[serde(default)]
    pub manufacturer_model: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub layers: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub os_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub match_all: bool,
}

impl SearchRequest {
    fn is_empty(&self) -> bool {
        self.host_match.is_empty()
            && self.manufacturer_name.is_empty()
            && self.manufacturer_model.is_empty()
            && self.location.is_empty()
            && self.layers.is_empty()
            && self.serial.is_empty()
            && self.os_name.is_empty()
            && self.os_version.is_empty()
    }
}

/// Translates `req` into a backend query plus a decision on whether local
/// post-filtering is still required.
pub fn compile(req: &SearchRequest) -> (SearchDeviceQuery, bool) {
    let mut query = SearchDeviceQuery::default();
    let mut post_filter = false;

    if !req.host_match.is_empty() {
        query.q = format!("{}%", req.host_match);
        post_filter = true;
    }
    if !req.serial.is_empty() {
        if req.host_match.is_empty() {
            query.q = "%".to_string();
        }
        post_filter = true;
    }
    // If q is set and match_all is false, the backend's `%`-prefix search
    // already fully satisfies the predicate.
    if !req.match_all && !req.host_match.is_empty() {
        post_filter = false;
    }
    if req.is_empty() {
        query.q = "%".to_string();
        post_filter = false;
    }

    if !post_filter {
        if !req.manufacturer_model.is_empty() {
            query.model = req.manufacturer_model.clone();
        }
        if !req.manufacturer_name.is_empty() {
            query.vendor = req.manufacturer_name.clone();
        }
        if !req.location.is_empty() {
            query.location = req.location.clone();
        }
        if !req.layers.is_empty() {
            query.layers = req.layers.clone();
        }
        if !req.os_name.is_empty() {
            query.os = req.os_name.clone();
        }
        if !req.os_version.is_empty() {
            query.os_ver = req.os_version.clone();
        }
    }

    (query, post_filter)
}

/// Case-insensitive substring match, per field, AND'd or OR'd per
/// `match_all`.
///
/// `match_all = true`: every non-empty field must match (AND) -- a single
/// miss rejects the device. `match_all = false`: the first non-empty
/// field that matches accepts the device (OR); only if none of the
/// non-empty fields match is it rejected.
fn device_matches(device: &Device, req: &SearchRequest) -> bool {
    let fields: [(&str, &str); 7] = [
        (&req.manufacturer_name, &device.vendor),
        (&req.manufacturer_model, &device.model),
        (&req.location, &device.location),
        (&req.layers, &device.layers),
        (&req.serial, &device.serial),
        (&req.os_name, &device.os),
        (&req.os_version, &device.os_ver),
    ];

    let mut any_field_set = false;
    for (predicate, value) in fields {
        if predicate.is_empty() {
            continue;
        }
        any_field_set = true;
        let matched = value.to_lowercase().contains(&predicate.to_lowercase());

        if req.match_all {
            if !matched {
                return false;
            }
        } else if matched {
            return true;
        }
    }

    // AND mode: every set field matched (or none were set) -> accept.
    // OR mode: reached the end without a hit -> reject, unless no field
    // was set at all, in which case there was nothing to reject on.
    if req.match_all || !any_field_set {
        true
    } else {
        false
    }
}

/// Runs the full search: compile the predicate, call the backend, and
/// apply local post-filtering if the backend couldn't express it all.
pub async fn search_devices(
    backend: &dyn BackendClient,
    req: &SearchRequest,
) -> Result<Vec<Device>, BackendError> {
    let (query, post_filter) = compile(req);
    let devices = backend.search_device(&query).await?;
    if !post_filter {
        return Ok(devices);
    }
    Ok(devices
        .into_iter()
        .filter(|d| device_matches(d, req))
        .collect())
}
