//! Status endpoint: build and runtime information

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_timestamp: &'static str,
    pub app_url: String,
    pub dev_mode: bool,
    pub store: &'static str,
    /// Registered models, in registration order
    pub models: Vec<ModelSummary>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn status_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let status = StatusResponse {
        service: "olaf",
        version: env!("CARGO_PKG_VERSION"),
        git_commit: env!("GIT_COMMIT_SHORT"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        app_url: state.args.app_url.clone(),
        dev_mode: state.args.dev_mode,
        store: state.store.backend(),
        models: state
            .registry
            .names()
            .iter()
            .filter_map(|name| state.registry.get(name).ok())
            .map(|model| ModelSummary {
                name: model.name().to_string(),
                description: model.description().map(str::to_string),
            })
            .collect(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };
    json_response(StatusCode::OK, &status)
}
