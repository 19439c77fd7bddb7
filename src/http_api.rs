//! HTTP/JSON API: the `/api/v1` route table plus Prometheus `/metrics`,
//! built on axum.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use crate::route::formatter_for;
use crate::scheduler::Resolver;
use crate::search::{search_devices, SearchRequest};

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<Resolver>,
    pub metrics: Option<PrometheusHandle>,
}

/// Wraps any error surfaced by a handler into a 500 with the error string
/// in the body, mirroring the `anyhow::Result` + `.context()` propagation
/// used elsewhere in this crate.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/entries", get(list_entries))
        .route("/api/v1/entries/:domain/devices", get(entry_devices))
        .route("/api/v1/entries/:domain/hosts", get(entry_hosts))
        .route("/api/v1/entries/:domain/ips", get(entry_ips))
        .route("/api/v1/entries/:domain/routes", get(entry_routes))
        .route("/api/v1/entries/:domain/routes/:format", get(entry_routes_format))
        .route("/api/v1/search/devices/:q", get(search_devices_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn list_entries(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.resolver.entries()))
}

async fn entry_devices(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> Json<serde_json::Value> {
    let devices = state.resolver.devices_for(&domain).await;
    Json(serde_json::json!(devices.as_ref()))
}

async fn entry_hosts(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> Json<serde_json::Value> {
    let devices = state.resolver.devices_for(&domain).await;
    let hosts: Vec<&str> = devices.iter().map(|d| d.dns.as_str()).collect();
    Json(serde_json::json!(hosts))
}

async fn entry_ips(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> Json<serde_json::Value> {
    let devices = state.resolver.devices_for(&domain).await;
    let ips: Vec<&str> = devices.iter().map(|d| d.ip.as_str()).collect();
    Json(serde_json::json!(ips))
}

#[derive(Debug, Deserialize)]
struct RoutesQuery {
    format: Option<String>,
}

async fn entry_routes(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
    Query(q): Query<RoutesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    build_routes(&state, &domain, q.format.as_deref()).await
}

async fn entry_routes_format(
    State(state): State<ApiState>,
    Path((domain, format)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    build_routes(&state, &domain, Some(&format)).await
}

/// Renders each device of `domain`'s entry through its routing template,
/// then applies the requested format adapter. `domain == "*"` renders
/// routes for every configured entry at once.
async fn build_routes(
    state: &ApiState,
    domain: &str,
    format: Option<&str>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if domain == "*" {
        let mut routes = Vec::new();
        for entry in state.resolver.entries() {
            let Some(template) = &entry.routing else {
                continue;
            };
            let devices = state.resolver.devices_for(&entry.domain).await;
            for device in devices.iter() {
                routes.push(template.render(device)?);
            }
        }
        return Ok(Json(formatter_for(format).convert(&routes)));
    }

    let Some(entry) = state.resolver.entry(domain) else {
        return Ok(Json(serde_json::json!([])));
    };
    let Some(template) = &entry.routing else {
        return Ok(Json(serde_json::json!([])));
    };

    let devices = state.resolver.devices_for(domain).await;
    let mut routes = Vec::with_capacity(devices.len());
    for device in devices.iter() {
        routes.push(template.render(device)?);
    }

    Ok(Json(formatter_for(format).convert(&routes)))
}

async fn search_devices_handler(
    State(state): State<ApiState>,
    Path(q): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if q.is_empty() {
        return Err((StatusCode::NOT_FOUND, "search query must not be empty".to_string()));
    }

    let req = SearchRequest {
        host_match: q,
        ..Default::default()
    };

    let devices = search_devices(state.resolver.backend(), &req)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if devices.is_empty() {
        return Err((StatusCode::NOT_FOUND, "no devices matched".to_string()));
    }
    Ok(Json(serde_json::json!(devices)))
}

async fn metrics_handler(State(state): State<ApiState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
