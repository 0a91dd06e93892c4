//! The management listener (§6): a separate, admin-password-gated router
//! bound to `main.management.{host,port}`, exposing the sanitized config
//! snapshot and a liveness probe. Broader admin-console functionality
//! (process control, statistics browsing) is left to a real deployment's
//! front-end; this is the minimal contract the spec names.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;

use gateway_core::config::ConfigStore;
use gateway_core::Supervisor;

#[derive(Clone)]
pub struct ManagementState {
    pub store: Arc<ConfigStore>,
    pub supervisor: Arc<Supervisor>,
    pub admin_password: Option<String>,
}

pub fn router(state: ManagementState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/processes", get(processes))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn config(State(state): State<ManagementState>, headers: HeaderMap) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.store.current().sanitized()).into_response()
}

async fn processes(State(state): State<ManagementState>, headers: HeaderMap) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let status: std::collections::HashMap<String, String> = state
        .supervisor
        .status()
        .into_iter()
        .map(|(id, state)| (id, format!("{state:?}")))
        .collect();
    Json(status).into_response()
}

fn is_authorized(state: &ManagementState, headers: &HeaderMap) -> bool {
    let Some(expected) = &state.admin_password else {
        return true;
    };
    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    supplied == Some(expected.as_str())
}
