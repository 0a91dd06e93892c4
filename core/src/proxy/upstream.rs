//! Reverse-proxies one request to a fixed upstream URL (§4.4 DISPATCHED).
//!
//! Built on `reqwest` so the same HTTP client (and its connection pool) also
//! backs the supervisor's health checker (§4.8) — one dependency doing both
//! jobs rather than a second hand-rolled client.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::net::IpAddr;
use std::time::Duration;

use super::is_hop_by_hop;
use crate::errors::GatewayError;

/// Default per-request upstream timeout (§4.4) when a route doesn't specify
/// one. 30s matches the teacher's own HTTP client defaults for outbound calls.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Proxies `method`/`path_and_query` to `target_base`, forwarding headers
/// (minus hop-by-hop ones) and injecting the `X-Forwarded-*` trio (§4.4).
///
/// Errors map onto [`GatewayError::UpstreamUnavailable`] (connect failure),
/// [`GatewayError::UpstreamTimeout`], or [`GatewayError::UpstreamProtocolError`]
/// (malformed response / mid-body failure) per §7.
pub async fn proxy_request(
    client: &reqwest::Client,
    target_base: &str,
    method: Method,
    path_and_query: &str,
    headers: HeaderMap,
    body: Bytes,
    client_ip: IpAddr,
    request_host: &str,
    timeout: Duration,
) -> Result<(StatusCode, HeaderMap, Body), GatewayError> {
    let url = format!("{}{}", target_base.trim_end_matches('/'), path_and_query);
    let url: reqwest::Url = url
        .parse()
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("invalid upstream URL: {e}")))?;

    proxy_to_url(client, url, method, headers, body, client_ip, request_host, timeout).await
}

/// Proxies directly to a fully-formed `url`, bypassing the `target_base` +
/// `path_and_query` concatenation `proxy_request` does for fixed-target
/// routes. Used by the Dynamic Forward Proxy (§4.6), whose target is
/// already a complete caller-supplied URL rather than something to append
/// the request path onto.
pub async fn proxy_to_url(
    client: &reqwest::Client,
    url: reqwest::Url,
    method: Method,
    mut headers: HeaderMap,
    body: Bytes,
    client_ip: IpAddr,
    request_host: &str,
    timeout: Duration,
) -> Result<(StatusCode, HeaderMap, Body), GatewayError> {
    headers.retain(|name, _| !is_hop_by_hop(name.as_str()));
    inject_forwarded_headers(&mut headers, client_ip, request_host);

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;

    let mut reqwest_headers = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if let (Ok(n), Ok(v)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            reqwest_headers.append(n, v);
        }
    }

    let response = client
        .request(reqwest_method, url)
        .headers(reqwest_headers)
        .body(body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout
            } else if e.is_connect() {
                GatewayError::UpstreamUnavailable(e.to_string())
            } else {
                GatewayError::UpstreamProtocolError(e.to_string())
            }
        })?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;

    let mut response_headers = HeaderMap::new();
    for (name, value) in response.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.append(n, v);
        }
    }

    let stream = response.bytes_stream();
    let body = Body::from_stream(stream);

    Ok((status, response_headers, body))
}

/// Injects `X-Forwarded-For`, `X-Forwarded-Proto`, and `X-Forwarded-Host`
/// (§4.4), appending to any existing `X-Forwarded-For` chain rather than
/// overwriting it so multi-hop deployments retain the full client chain.
pub fn inject_forwarded_headers(headers: &mut HeaderMap, client_ip: IpAddr, request_host: &str) {
    let forwarded_for = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", v);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
    if let Ok(v) = HeaderValue::from_str(request_host) {
        headers.insert("x-forwarded-host", v);
    }
}

/// Derives the effective client IP per §4.4's precedence: `X-Forwarded-For`
/// (first entry), then `X-Real-IP`, then `X-Client-IP`, then the socket peer.
pub fn derive_client_ip(headers: &HeaderMap, peer: IpAddr) -> IpAddr {
    if let Some(v) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = v.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }
    for header in ["x-real-ip", "x-client-ip"] {
        if let Some(ip) = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
        {
            return ip;
        }
    }
    peer
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn prefers_forwarded_for_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.5"));
        let peer = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(
            derive_client_ip(&headers, peer),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))
        );
    }

    #[test]
    fn falls_back_to_peer_when_no_headers_present() {
        let headers = HeaderMap::new();
        let peer = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(derive_client_ip(&headers, peer), peer);
    }

    #[test]
    fn appends_to_existing_forwarded_for_chain() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        inject_forwarded_headers(&mut headers, IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)), "a.example.com");
        assert_eq!(
            headers.get("x-forwarded-for").unwrap().to_str().unwrap(),
            "1.1.1.1, 2.2.2.2"
        );
    }
}
