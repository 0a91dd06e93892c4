//! # Request Dispatcher
//!
//! Drives one request through the seven states of §4.4: RECEIVED →
//! FILTERED → RATE-CHECKED → AUTH-GATED → REWRITTEN → DISPATCHED →
//! RECORDED. Every terminal branch — including every rejection — falls
//! through to RECORDED so the statistics collaborator sees a complete
//! picture, not just the happy path.
//!
//! This module knows nothing about axum's listener or TLS plumbing; it
//! takes a transport-agnostic [`DispatchRequest`] and returns a
//! [`DispatchOutcome`], so a WebSocket upgrade can be handed back to the
//! caller (who alone holds the extractors axum's upgrade machinery needs)
//! instead of being performed here.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};

use crate::collaborators::{OAuth2Provider, RequestRecord, StatisticsSink};
use crate::config::route::{Route, RouteKind};
use crate::config::{ConfigSnapshot, ConfigStore};
use crate::errors::GatewayError;
use crate::filters::{self, GeoLookup};
use crate::proxy::{forward, static_server, upstream};
use crate::ratelimit::{RateLimitDecision, RateLimiter};
use crate::session::SessionGate;

/// Query parameter the Dynamic Forward Proxy reads its target URL from (§4.6).
const FORWARD_TARGET_PARAM: &str = "url";

/// Cookie carrying the session id minted by the Auth Gate (§4.9).
const SESSION_COOKIE_NAME: &str = "gw_session";

/// A transport-agnostic inbound request (§4.4 RECEIVED).
pub struct DispatchRequest {
    pub method: Method,
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer_ip: IpAddr,
    pub is_tls: bool,
    pub websocket_upgrade: bool,
}

/// A transport-agnostic outbound response.
pub struct DispatchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl DispatchResponse {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    fn text(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status,
            headers,
            body: Body::from(body),
        }
    }
}

/// What to do with a dispatched request once [`Dispatcher::dispatch`] returns.
pub enum DispatchOutcome {
    /// A complete response ready to be sent to the client.
    Response(DispatchResponse),
    /// The request is a WebSocket upgrade that should be spliced to
    /// `upstream_ws_url`; the caller performs the actual axum upgrade and
    /// then calls [`crate::proxy::websocket::splice`] (§4.4, §4.5).
    WebSocketUpgrade { upstream_ws_url: String },
}

/// Rate limiter tagged with the generation it was built for, so a reload
/// that changes `windowMs`/`maxRequests` takes effect on the next request
/// rather than waiting for a process restart (§4.5, §9).
struct GenerationalLimiter {
    generation: u64,
    limiter: Arc<RateLimiter>,
}

/// Wires the routing table, filters, rate limiter, auth gate, and proxy
/// engines together into the per-request state machine (§4.4).
///
/// The Session Gate is built once at construction rather than per
/// generation, since its backing [`crate::session::SessionStore`] isn't
/// reconstructible from config alone (§9 — see DESIGN.md); the rate
/// limiter, which is pure in-memory state keyed only by config values, is
/// rebuilt lazily whenever the snapshot generation advances.
pub struct Dispatcher {
    store: Arc<ConfigStore>,
    geo_lookup: Arc<dyn GeoLookup>,
    oauth2: Arc<dyn OAuth2Provider>,
    stats: Arc<dyn StatisticsSink>,
    session_gate: Arc<SessionGate>,
    session_timeout_ms: u64,
    http_client: reqwest::Client,
    limiter: Mutex<GenerationalLimiter>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ConfigStore>,
        geo_lookup: Arc<dyn GeoLookup>,
        oauth2: Arc<dyn OAuth2Provider>,
        stats: Arc<dyn StatisticsSink>,
        session_gate: Arc<SessionGate>,
        session_timeout_ms: u64,
        http_client: reqwest::Client,
    ) -> Self {
        let snapshot = store.current();
        let limiter = Arc::new(RateLimiter::new(&snapshot.proxy.security.rate_limit));
        Self {
            store,
            geo_lookup,
            oauth2,
            stats,
            session_gate,
            session_timeout_ms,
            http_client,
            limiter: Mutex::new(GenerationalLimiter {
                generation: snapshot.generation,
                limiter,
            }),
        }
    }

    fn rate_limiter_for(&self, snapshot: &ConfigSnapshot) -> Arc<RateLimiter> {
        let mut guard = self.limiter.lock().unwrap_or_else(|e| e.into_inner());
        if guard.generation != snapshot.generation {
            guard.generation = snapshot.generation;
            guard.limiter = Arc::new(RateLimiter::new(&snapshot.proxy.security.rate_limit));
        }
        guard.limiter.clone()
    }

    /// Drives `req` through RECEIVED → ... → RECORDED.
    pub async fn dispatch(&self, req: DispatchRequest) -> DispatchOutcome {
        let start = Instant::now();
        // Captured once and held for the whole request so a concurrent
        // reload can never hand one request a mix of old and new config
        // (§4.2 atomicity invariant).
        let snapshot = self.store.current();

        let route = match crate::routing::resolve(&snapshot, &req.host, &req.path) {
            crate::routing::ResolveOutcome::Matched { route, .. } => route,
            crate::routing::ResolveOutcome::NoMatch => {
                self.record(None, &req, 404, start);
                return DispatchOutcome::Response(not_found());
            }
        };
        let route_key = route_key(route);

        if is_cors_preflight(&req, route) {
            let resp = preflight_response(route);
            self.record(Some(route), &req, resp.status.as_u16(), start);
            return DispatchOutcome::Response(resp);
        }

        // FILTERED
        let geo = filters::evaluate(route.geolocation.as_ref(), req.peer_ip, self.geo_lookup.as_ref());
        if geo == filters::GeoDecision::Block {
            let resp = geo_block_response(route);
            self.record(Some(route), &req, resp.status.as_u16(), start);
            return DispatchOutcome::Response(resp);
        }

        // RATE-CHECKED
        let limiter = self.rate_limiter_for(&snapshot);
        if let RateLimitDecision::Limited { retry_after_secs } = limiter.check(&route_key, req.peer_ip) {
            let resp = error_response(&GatewayError::RateLimited { retry_after_secs });
            self.record(Some(route), &req, resp.status.as_u16(), start);
            return DispatchOutcome::Response(resp);
        }

        // AUTH-GATED
        if route.require_auth && !is_public_path(route, &req.path) {
            if self.check_session(route, &req).is_none() {
                let err = self.auth_required_error(route, &req);
                let resp = error_response(&err);
                self.record(Some(route), &req, resp.status.as_u16(), start);
                return DispatchOutcome::Response(resp);
            }
        }

        // REWRITTEN
        let rewritten_path = apply_rewrites(&route.rewrite.0, &req.path);
        let client_ip = upstream::derive_client_ip(&req.headers, req.peer_ip);
        let mut outbound_headers = req.headers.clone();
        inject_route_headers(&mut outbound_headers, route);

        if req.websocket_upgrade && route.kind == RouteKind::Proxy {
            if let Some(target) = &route.target {
                let ws_url = to_websocket_url(target, &rewritten_path, req.query.as_deref());
                self.stats.record(RequestRecord {
                    route_domain: Some(route.domain.clone()),
                    path: req.path.clone(),
                    status: 101,
                    client_ip,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                return DispatchOutcome::WebSocketUpgrade { upstream_ws_url: ws_url };
            }
        }

        // DISPATCHED
        let result = self
            .dispatch_kind(&snapshot, route, &req, &rewritten_path, outbound_headers, client_ip)
            .await;
        let mut response = match result {
            Ok(resp) => resp,
            Err(e) => error_response(&e),
        };
        apply_response_security_headers(&mut response, &snapshot, route);

        // RECORDED
        self.record(Some(route), &req, response.status.as_u16(), start);
        DispatchOutcome::Response(response)
    }

    async fn dispatch_kind(
        &self,
        snapshot: &ConfigSnapshot,
        route: &Route,
        req: &DispatchRequest,
        rewritten_path: &str,
        headers: HeaderMap,
        client_ip: IpAddr,
    ) -> Result<DispatchResponse, GatewayError> {
        match route.kind {
            RouteKind::Proxy => {
                let target = route
                    .target
                    .as_deref()
                    .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("proxy route missing target")))?;
                let path_and_query = with_query(rewritten_path, req.query.as_deref());
                let (status, headers, body) = upstream::proxy_request(
                    &self.http_client,
                    target,
                    req.method.clone(),
                    &path_and_query,
                    headers,
                    req.body.clone(),
                    client_ip,
                    &req.host,
                    upstream::DEFAULT_UPSTREAM_TIMEOUT,
                )
                .await?;
                Ok(DispatchResponse { status, headers, body })
            }
            RouteKind::Static => {
                let static_path = route.static_path.as_deref().ok_or_else(|| {
                    GatewayError::Internal(anyhow::anyhow!("static route missing staticPath"))
                })?;
                let (status, content_type, body) =
                    static_server::serve(std::path::Path::new(static_path), rewritten_path, route.spa_fallback)
                        .await;
                let mut response_headers = HeaderMap::new();
                if let Some(ct) = content_type {
                    response_headers.insert(header::CONTENT_TYPE, ct);
                }
                Ok(DispatchResponse { status, headers: response_headers, body })
            }
            RouteKind::Redirect => {
                let target = route
                    .target
                    .clone()
                    .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("redirect route missing target")))?;
                let status = route
                    .redirect_status
                    .and_then(StatusCode::from_u16)
                    .unwrap_or(StatusCode::MOVED_PERMANENTLY);
                let mut response_headers = HeaderMap::new();
                let location = HeaderValue::from_str(&target)
                    .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;
                response_headers.insert(header::LOCATION, location);
                Ok(DispatchResponse { status, headers: response_headers, body: Body::empty() })
            }
            RouteKind::Forward => {
                let raw_target = query_param(req.query.as_deref(), FORWARD_TARGET_PARAM);
                let url = forward::validate_target(
                    raw_target.as_deref(),
                    &snapshot.proxy.security.forward_allow_list,
                )?;
                let (status, headers, body) = upstream::proxy_to_url(
                    &self.http_client,
                    url,
                    req.method.clone(),
                    headers,
                    req.body.clone(),
                    client_ip,
                    &req.host,
                    upstream::DEFAULT_UPSTREAM_TIMEOUT,
                )
                .await?;
                Ok(DispatchResponse { status, headers, body })
            }
        }
    }

    fn check_session(&self, route: &Route, req: &DispatchRequest) -> Option<crate::session::Session> {
        let id = extract_cookie(&req.headers, SESSION_COOKIE_NAME)?;
        self.session_gate.check(id, &route.domain)
    }

    fn auth_required_error(&self, route: &Route, req: &DispatchRequest) -> GatewayError {
        let is_browser = req
            .headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        let redirect_url = self.oauth2.begin_authorization(route, &req.path);
        GatewayError::AuthRequired { redirect_url, is_browser }
    }

    fn record(&self, route: Option<&Route>, req: &DispatchRequest, status: u16, start: Instant) {
        self.stats.record(RequestRecord {
            route_domain: route.map(|r| r.domain.clone()),
            path: req.path.clone(),
            status,
            client_ip: req.peer_ip,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }
}

fn route_key(route: &Route) -> String {
    format!("{}{}", route.domain, route.path.as_deref().unwrap_or(""))
}

fn is_cors_preflight(req: &DispatchRequest, route: &Route) -> bool {
    req.method == Method::OPTIONS && route.cors_enabled() && req.headers.contains_key(header::ORIGIN)
}

fn preflight_response(route: &Route) -> DispatchResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Ok(methods) = HeaderValue::from_str(&route.cors_methods().join(", ")) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods);
    }
    DispatchResponse { status: StatusCode::NO_CONTENT, headers, body: Body::empty() }
}

fn is_public_path(route: &Route, path: &str) -> bool {
    route.public_paths.iter().any(|p| path.starts_with(p.as_str()))
}

/// Applies `route.rewrite`'s `(pattern, replacement)` pairs to `path` in
/// declaration order (§4.4 REWRITTEN). A pattern that fails to compile is
/// skipped rather than aborting the whole chain — malformed regexes are
/// caught at config-validation time, not mid-request.
fn apply_rewrites(rules: &[(String, String)], path: &str) -> String {
    let mut current = path.to_string();
    for (pattern, replacement) in rules {
        if let Ok(re) = regex::Regex::new(pattern) {
            current = re.replace(&current, replacement.as_str()).into_owned();
        }
    }
    current
}

fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}

fn to_websocket_url(target_base: &str, path: &str, query: Option<&str>) -> String {
    let scheme_stripped = target_base
        .strip_prefix("https://")
        .map(|rest| format!("wss://{rest}"))
        .or_else(|| target_base.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
        .unwrap_or_else(|| target_base.to_string());
    format!("{}{}", scheme_stripped.trim_end_matches('/'), with_query(path, query))
}

/// Injects a route's configured response headers and merges the
/// CSP/CORS overlay (§4.4 tie-breaks, §9).
fn inject_route_headers(headers: &mut HeaderMap, route: &Route) {
    for (name, value) in &route.headers {
        if let (Ok(n), Ok(v)) = (
            axum::http::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(n, v);
        }
    }
}

fn apply_response_security_headers(response: &mut DispatchResponse, snapshot: &ConfigSnapshot, route: &Route) {
    let csp = filters::merge_csp(&snapshot.proxy.security.csp, route);
    if !csp.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&csp.join("; ")) {
            response.headers.insert(header::CONTENT_SECURITY_POLICY, v);
        }
    }
    if route.cors_enabled() {
        response
            .headers
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
}

fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let mut kv = part.trim().splitn(2, '=');
        let k = kv.next()?;
        let v = kv.next()?;
        (k == name).then_some(v)
    })
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn not_found() -> DispatchResponse {
    DispatchResponse::text(StatusCode::NOT_FOUND, "not found")
}

fn geo_block_response(route: &Route) -> DispatchResponse {
    let Some(filter) = &route.geolocation else {
        return DispatchResponse::text(StatusCode::FORBIDDEN, "forbidden");
    };
    if let Some(target) = &filter.block_redirect {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(target) {
            headers.insert(header::LOCATION, v);
        }
        return DispatchResponse {
            status: StatusCode::FOUND,
            headers,
            body: Body::empty(),
        };
    }
    let status = filter
        .block_status
        .and_then(StatusCode::from_u16)
        .unwrap_or(StatusCode::FORBIDDEN);
    let mut resp = DispatchResponse::text(status, "forbidden");
    if let Some(message) = &filter.block_message {
        resp.body = Body::from(message.clone());
    }
    resp
}

/// Renders a [`GatewayError`] into a response, applying the status-code
/// mapping plus whatever per-variant headers (`Retry-After`, `Location`)
/// the client needs (§7).
fn error_response(err: &GatewayError) -> DispatchResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        GatewayError::RateLimited { retry_after_secs } => {
            let mut resp = DispatchResponse::text(status, "rate limit exceeded");
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                resp.headers.insert(header::RETRY_AFTER, v);
            }
            resp
        }
        GatewayError::AuthRequired { redirect_url, is_browser } => {
            if *is_browser {
                let mut resp = DispatchResponse::new(status);
                if let Ok(v) = HeaderValue::from_str(redirect_url) {
                    resp.headers.insert(header::LOCATION, v);
                }
                resp
            } else {
                DispatchResponse::text(status, "authentication required")
            }
        }
        GatewayError::UpstreamUnavailable(_) => DispatchResponse::text(status, "upstream unavailable"),
        GatewayError::UpstreamTimeout => DispatchResponse::text(status, "upstream timed out"),
        GatewayError::UpstreamProtocolError(_) => DispatchResponse::text(status, "upstream protocol error"),
        GatewayError::ForwardTargetRejected(_) => DispatchResponse::text(status, "forward target rejected"),
        GatewayError::NoRouteMatched => not_found(),
        GatewayError::GeoBlocked { .. } => DispatchResponse::text(status, "forbidden"),
        GatewayError::Internal(_) => DispatchResponse::text(status, "internal error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NullStatisticsSink;
    use crate::config::store::ConfigPathSet;
    use crate::filters::NullGeoLookup;
    use crate::session::{InMemorySessionStore, SessionGate};
    use async_trait::async_trait;
    use std::io::Write;
    use std::net::Ipv4Addr;

    struct FakeOAuth2;

    #[async_trait]
    impl OAuth2Provider for FakeOAuth2 {
        fn begin_authorization(&self, route: &Route, return_path: &str) -> String {
            format!("https://provider.example/authorize?domain={}&return={}", route.domain, return_path)
        }
        async fn handle_callback(&self, _route: &Route, _query: &str) -> anyhow::Result<String> {
            Ok("user".to_string())
        }
    }

    fn write_tmp(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn dispatcher(dir: &tempfile::TempDir, proxy_yaml: &str) -> Dispatcher {
        let main = write_tmp(dir, "main.yaml", "");
        let proxy = write_tmp(dir, "proxy.yaml", proxy_yaml);
        let store = Arc::new(
            crate::config::ConfigStore::load(ConfigPathSet { main, proxy, processes: None }).unwrap(),
        );
        let session_gate = Arc::new(SessionGate::new(10, 60_000, Box::new(InMemorySessionStore::default())));
        Dispatcher::new(
            store,
            Arc::new(NullGeoLookup),
            Arc::new(FakeOAuth2),
            Arc::new(NullStatisticsSink),
            session_gate,
            60_000,
            reqwest::Client::new(),
        )
    }

    fn base_request(host: &str, path: &str) -> DispatchRequest {
        DispatchRequest {
            method: Method::GET,
            host: host.to_string(),
            path: path.to_string(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            peer_ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            is_tls: false,
            websocket_upgrade: false,
        }
    }

    #[tokio::test]
    async fn unmatched_route_is_404_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir, "routes: []\n");
        let outcome = d.dispatch(base_request("nowhere.example.com", "/")).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!("expected response") };
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn redirect_route_uses_configured_status() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://new.example.com/\n    redirectStatus: 307\n",
        );
        let outcome = d.dispatch(base_request("a.example.com", "/old")).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!("expected response") };
        assert_eq!(resp.status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers.get(header::LOCATION).unwrap(), "https://new.example.com/");
    }

    #[tokio::test]
    async fn redirect_defaults_to_301() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://new.example.com/\n",
        );
        let outcome = d.dispatch(base_request("a.example.com", "/old")).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!("expected response") };
        assert_eq!(resp.status, StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn rate_limit_blocks_after_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://x/\nsecurity:\n  rateLimit:\n    windowMs: 60000\n    maxRequests: 1\n",
        );
        let first = d.dispatch(base_request("a.example.com", "/")).await;
        let DispatchOutcome::Response(r1) = first else { panic!() };
        assert_eq!(r1.status, StatusCode::MOVED_PERMANENTLY);

        let second = d.dispatch(base_request("a.example.com", "/")).await;
        let DispatchOutcome::Response(r2) = second else { panic!() };
        assert_eq!(r2.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(r2.headers.contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn auth_required_redirects_browser_clients() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://x/\n    requireAuth: true\n",
        );
        let mut req = base_request("a.example.com", "/secret");
        req.headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        let outcome = d.dispatch(req).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!() };
        assert_eq!(resp.status, StatusCode::FOUND);
        assert!(resp.headers.get(header::LOCATION).unwrap().to_str().unwrap().contains("provider.example"));
    }

    #[tokio::test]
    async fn auth_required_is_401_for_api_clients() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://x/\n    requireAuth: true\n",
        );
        let mut req = base_request("a.example.com", "/secret");
        req.headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let outcome = d.dispatch(req).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!() };
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn public_path_bypasses_auth_gate() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://x/\n    requireAuth: true\n    publicPaths:\n      - /health\n",
        );
        let outcome = d.dispatch(base_request("a.example.com", "/health")).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!() };
        assert_eq!(resp.status, StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn options_preflight_short_circuits_before_auth_gate() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(
            &dir,
            "routes:\n  - domain: a.example.com\n    type: redirect\n    target: https://x/\n    requireAuth: true\n    cors: true\n",
        );
        let mut req = base_request("a.example.com", "/secret");
        req.method = Method::OPTIONS;
        req.headers.insert(header::ORIGIN, HeaderValue::from_static("https://caller.example"));
        let outcome = d.dispatch(req).await;
        let DispatchOutcome::Response(resp) = outcome else { panic!() };
        assert_eq!(resp.status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn rewrites_apply_in_declaration_order() {
        let rules = vec![
            ("^/api/".to_string(), "/v1/".to_string()),
            ("^/v1/".to_string(), "/internal/v1/".to_string()),
        ];
        assert_eq!(apply_rewrites(&rules, "/api/users"), "/internal/v1/users");
    }

    #[test]
    fn forward_query_param_is_extracted_and_decoded() {
        let q = "url=https%3A%2F%2Fexample.com%2Fpath&other=1";
        assert_eq!(query_param(Some(q), "url").as_deref(), Some("https://example.com/path"));
    }

    #[test]
    fn websocket_url_rewrites_http_scheme_to_ws() {
        assert_eq!(to_websocket_url("http://127.0.0.1:9000", "/socket", None), "ws://127.0.0.1:9000/socket");
        assert_eq!(to_websocket_url("https://x.example", "/socket", Some("a=1")), "wss://x.example/socket?a=1");
    }
}
