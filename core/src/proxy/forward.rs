//! Dynamic Forward Proxy (§4.6): proxies to a URL supplied by the caller
//! (typically via a query parameter) rather than a route's fixed `target`.
//! Default-closed: nothing is forwarded unless the target host appears on
//! the operator's allow-list, and private/loopback/link-local addresses are
//! always rejected regardless of the allow-list (SSRF guard).

use std::net::IpAddr;
use url::Url;

use crate::errors::GatewayError;

/// Validates a caller-supplied forward target against the operator's
/// allow-list and the SSRF guard, returning the parsed URL on success.
///
/// Failure modes per §7: a missing/malformed target is a 400
/// (`ForwardTargetRejected` whose reason doesn't mention "disallowed"); an
/// allow-list miss or SSRF-guarded address is a 403 (reason mentions
/// "disallowed", matched by [`GatewayError::status_code`]).
pub fn validate_target(raw_target: Option<&str>, allow_list: &[String]) -> Result<Url, GatewayError> {
    let raw = raw_target.ok_or_else(|| {
        GatewayError::ForwardTargetRejected("missing target parameter".to_string())
    })?;

    let url = Url::parse(raw)
        .map_err(|e| GatewayError::ForwardTargetRejected(format!("malformed target: {e}")))?;

    if url.scheme() != "https" {
        return Err(GatewayError::ForwardTargetRejected(
            "only https targets are permitted".to_string(),
        ));
    }

    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::ForwardTargetRejected("target has no host".to_string()))?;

    if allow_list.is_empty() || !allow_list.iter().any(|allowed| allowed == host) {
        return Err(GatewayError::ForwardTargetRejected(format!(
            "host {host} is disallowed by the forward proxy allow-list"
        )));
    }

    if let Some(ip) = resolve_literal_ip(host) {
        if is_disallowed_address(ip) {
            return Err(GatewayError::ForwardTargetRejected(format!(
                "host {host} resolves to a disallowed private address"
            )));
        }
    }

    Ok(url)
}

fn resolve_literal_ip(host: &str) -> Option<IpAddr> {
    host.parse().ok()
}

/// True for loopback, private (RFC 1918 / ULA), and link-local addresses —
/// none of which a public-facing forward proxy should ever reach (§4.6).
fn is_disallowed_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_target_is_rejected_as_bad_request() {
        let err = validate_target(None, &["example.com".to_string()]).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn host_not_on_allow_list_is_forbidden() {
        let err =
            validate_target(Some("https://evil.example.net/"), &["example.com".to_string()])
                .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn empty_allow_list_rejects_everything() {
        let err = validate_target(Some("https://example.com/"), &[]).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn non_https_scheme_is_bad_request() {
        let err =
            validate_target(Some("http://example.com/"), &["example.com".to_string()])
                .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn literal_private_ip_is_rejected_even_if_allow_listed() {
        let err = validate_target(
            Some("https://10.0.0.5/"),
            &["10.0.0.5".to_string()],
        )
        .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn allow_listed_public_host_is_accepted() {
        let url = validate_target(Some("https://example.com/path"), &["example.com".to_string()])
            .unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }
}
