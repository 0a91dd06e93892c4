//! # Filters
//!
//! Geolocation allow/block decisions (§4.4 FILTERED, §4.7) and the
//! CSP/CORS header overlay applied to every dispatched response (§9).

use std::net::IpAddr;

use crate::config::route::{GeolocationFilter, Route, UnknownGeoPolicy};

/// Resolves a client IP to an ISO country code. A real deployment backs
/// this with a MaxMind-style database; that lookup is an external
/// collaborator out of scope here (§1) — callers inject an implementation.
pub trait GeoLookup: Send + Sync {
    /// Returns `None` when the IP can't be resolved (private range, lookup
    /// miss, database unavailable) — handled per-route via `unknown` (§4.7).
    fn country_of(&self, ip: IpAddr) -> Option<String>;
}

/// A [`GeoLookup`] that never resolves anything; used when no geolocation
/// collaborator is configured so every route with a filter falls through to
/// its `unknown` policy.
pub struct NullGeoLookup;

impl GeoLookup for NullGeoLookup {
    fn country_of(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// Outcome of evaluating a route's geolocation filter against one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoDecision {
    Allow,
    Block,
}

/// Evaluates `filter` (if any) against `ip` using `lookup` (§4.4, §4.7).
///
/// Precedence: allow-list (if non-empty, membership required) then
/// block-list (membership rejects), then the `unknown` policy when the
/// country can't be determined. No filter configured always allows.
pub fn evaluate(filter: Option<&GeolocationFilter>, ip: IpAddr, lookup: &dyn GeoLookup) -> GeoDecision {
    let Some(filter) = filter else {
        return GeoDecision::Allow;
    };

    match lookup.country_of(ip) {
        None => match filter.unknown {
            UnknownGeoPolicy::Allow => GeoDecision::Allow,
            UnknownGeoPolicy::Block => GeoDecision::Block,
        },
        Some(country) => {
            if !filter.allow_countries.is_empty() && !filter.allow_countries.contains(&country) {
                return GeoDecision::Block;
            }
            if filter.block_countries.contains(&country) {
                return GeoDecision::Block;
            }
            GeoDecision::Allow
        }
    }
}

/// Merges the server-wide base CSP directives with a route's overlay (§9).
///
/// Open question resolved (see DESIGN.md): overlay semantics are
/// concatenation with last-writer-wins de-duplication by directive name
/// (the part before the first space), so a route can narrow or replace a
/// single directive (e.g. `script-src`) without having to restate the rest
/// of the base policy.
pub fn merge_csp(base: &[String], route: &Route) -> Vec<String> {
    let Some(overlay) = &route.csp else {
        return base.to_vec();
    };

    let mut by_directive: Vec<(String, String)> = Vec::new();
    for directive in base.iter().chain(overlay.iter()) {
        let name = directive.split_whitespace().next().unwrap_or(directive);
        if let Some(existing) = by_directive.iter_mut().find(|(n, _)| n == name) {
            existing.1 = directive.clone();
        } else {
            by_directive.push((name.to_string(), directive.clone()));
        }
    }
    by_directive.into_iter().map(|(_, v)| v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct FixedLookup(Option<String>);
    impl GeoLookup for FixedLookup {
        fn country_of(&self, _ip: IpAddr) -> Option<String> {
            self.0.clone()
        }
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))
    }

    #[test]
    fn no_filter_always_allows() {
        assert_eq!(evaluate(None, ip(), &NullGeoLookup), GeoDecision::Allow);
    }

    #[test]
    fn unknown_country_defaults_to_allow() {
        let filter = GeolocationFilter {
            allow_countries: vec![],
            block_countries: vec!["RU".into()],
            unknown: UnknownGeoPolicy::Allow,
            block_status: None,
            block_message: None,
            block_redirect: None,
        };
        assert_eq!(
            evaluate(Some(&filter), ip(), &NullGeoLookup),
            GeoDecision::Allow
        );
    }

    #[test]
    fn unknown_country_can_be_configured_to_block() {
        let filter = GeolocationFilter {
            allow_countries: vec![],
            block_countries: vec![],
            unknown: UnknownGeoPolicy::Block,
            block_status: None,
            block_message: None,
            block_redirect: None,
        };
        assert_eq!(
            evaluate(Some(&filter), ip(), &NullGeoLookup),
            GeoDecision::Block
        );
    }

    #[test]
    fn allow_list_rejects_non_members() {
        let filter = GeolocationFilter {
            allow_countries: vec!["US".into()],
            block_countries: vec![],
            unknown: UnknownGeoPolicy::Allow,
            block_status: None,
            block_message: None,
            block_redirect: None,
        };
        let lookup = FixedLookup(Some("DE".into()));
        assert_eq!(evaluate(Some(&filter), ip(), &lookup), GeoDecision::Block);
    }

    #[test]
    fn csp_overlay_replaces_matching_directive_and_appends_new_ones() {
        let base = vec!["default-src 'self'".to_string(), "script-src 'self'".to_string()];
        let yaml = r#"
domain: a.example.com
target: http://127.0.0.1
csp:
  - "script-src 'self' https://cdn.example.com"
  - "frame-ancestors 'none'"
"#;
        let route: Route = serde_yml::from_str(yaml).unwrap();
        let merged = merge_csp(&base, &route);
        assert_eq!(
            merged,
            vec![
                "default-src 'self'".to_string(),
                "script-src 'self' https://cdn.example.com".to_string(),
                "frame-ancestors 'none'".to_string(),
            ]
        );
    }
}
