//! Bridges axum's request/response types to [`gateway_core::dispatch`]'s
//! transport-agnostic [`DispatchRequest`]/[`DispatchOutcome`] (§4.4).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use gateway_core::dispatch::{DispatchOutcome, DispatchRequest, DispatchResponse, Dispatcher};
use gateway_core::proxy::websocket;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub is_tls: bool,
    pub acme_challenge_dir: PathBuf,
}

/// Builds the public-facing router: the ACME HTTP-01 challenge route takes
/// priority (§6), everything else falls through to the dispatcher.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(crate::acme::serve_challenge))
        .fallback(handle)
        .with_state(state)
}

async fn handle(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    ws_upgrade: Option<WebSocketUpgrade>,
    body: Bytes,
) -> Response {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
        .unwrap_or_else(|| uri.host().unwrap_or("").to_string());

    let path = uri.path().to_string();
    let query = uri.query().map(|q| q.to_string());

    let req = DispatchRequest {
        method,
        host,
        path,
        query,
        headers,
        body,
        peer_ip: addr.ip(),
        is_tls: state.is_tls,
        websocket_upgrade: ws_upgrade.is_some(),
    };

    match state.dispatcher.dispatch(req).await {
        DispatchOutcome::Response(resp) => to_axum_response(resp),
        DispatchOutcome::WebSocketUpgrade { upstream_ws_url } => match ws_upgrade {
            Some(upgrade) => upgrade.on_upgrade(move |socket| async move {
                websocket::splice(socket, &upstream_ws_url).await;
            }),
            // Dispatcher only returns this variant when the request carried
            // a real upgrade; this branch is unreachable in practice.
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
    }
}

fn to_axum_response(resp: DispatchResponse) -> Response {
    let mut builder = Response::builder().status(resp.status);
    if let Some(headers) = builder.headers_mut() {
        *headers = resp.headers;
    }
    builder.body(resp.body).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
