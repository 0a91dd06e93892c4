//! # Route Resolver
//!
//! Matches an incoming `(host, path)` against the active snapshot's routing
//! table (§3, §4.3): exact domain match, then the longest path prefix; ties
//! broken by declaration order; a route with no `path` matches everything on
//! its domain but loses to any route that has one.

use crate::config::{ConfigSnapshot, Route};

/// Outcome of resolving a request against the routing table.
#[derive(Debug)]
pub enum ResolveOutcome<'a> {
    /// A route matched; `prefix_len` is how much of the path its own
    /// `path` prefix consumed (used by the dispatcher if it ever needs to
    /// strip the matched prefix before forwarding — §4.4 REWRITTEN).
    Matched { route: &'a Route, prefix_len: usize },
    /// No route's domain matched at all, or none whose path prefix matched.
    NoMatch,
}

/// Resolves `(host, path)` against `snapshot`'s routing table (§4.3).
///
/// Matching rule: among routes whose `domain` equals `host` (case
/// insensitive) and whose `path` (if any) is a prefix of `path`, the one
/// with the longest prefix wins; a route with no `path` has prefix length 0
/// and so only wins when no other candidate route matches. Ties at equal
/// prefix length are broken by declaration order (first listed wins).
pub fn resolve<'a>(snapshot: &'a ConfigSnapshot, host: &str, path: &str) -> ResolveOutcome<'a> {
    let mut best: Option<(&Route, usize)> = None;

    for route in snapshot.routes_for_domain(host) {
        let Some(len) = route.prefix_len(path) else {
            continue;
        };
        match best {
            Some((_, best_len)) if len <= best_len => {}
            _ => best = Some((route, len)),
        }
    }

    match best {
        Some((route, prefix_len)) => ResolveOutcome::Matched { route, prefix_len },
        None => ResolveOutcome::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MainConfig, ProxyConfig};
    use std::collections::HashMap;

    fn snapshot(routes_yaml: &str) -> std::sync::Arc<ConfigSnapshot> {
        let proxy: ProxyConfig = serde_yml::from_str(routes_yaml).unwrap();
        ConfigSnapshot::new(MainConfig::default(), proxy, HashMap::new(), 1)
    }

    #[test]
    fn no_match_when_domain_absent() {
        let snap = snapshot("routes: []\n");
        assert!(matches!(
            resolve(&snap, "nowhere.example.com", "/"),
            ResolveOutcome::NoMatch
        ));
    }

    #[test]
    fn route_with_no_path_matches_anything_on_domain() {
        let snap = snapshot(
            "routes:\n  - domain: a.example.com\n    target: http://127.0.0.1:9000\n",
        );
        let ResolveOutcome::Matched { prefix_len, .. } =
            resolve(&snap, "a.example.com", "/anything/deep")
        else {
            panic!("expected match");
        };
        assert_eq!(prefix_len, 0);
    }

    #[test]
    fn longest_prefix_wins_over_catch_all() {
        let snap = snapshot(
            r#"routes:
  - domain: a.example.com
    target: http://127.0.0.1:9000
  - domain: a.example.com
    path: /api
    target: http://127.0.0.1:9100
"#,
        );
        let ResolveOutcome::Matched { route, prefix_len } =
            resolve(&snap, "a.example.com", "/api/users")
        else {
            panic!("expected match");
        };
        assert_eq!(route.target.as_deref(), Some("http://127.0.0.1:9100"));
        assert_eq!(prefix_len, 4);
    }

    #[test]
    fn ties_broken_by_declaration_order() {
        let snap = snapshot(
            r#"routes:
  - domain: a.example.com
    path: /api
    target: http://127.0.0.1:1111
  - domain: a.example.com
    path: /api
    target: http://127.0.0.1:2222
"#,
        );
        let ResolveOutcome::Matched { route, .. } = resolve(&snap, "a.example.com", "/api/x")
        else {
            panic!("expected match");
        };
        assert_eq!(route.target.as_deref(), Some("http://127.0.0.1:1111"));
    }

    #[test]
    fn domain_match_is_case_insensitive() {
        let snap = snapshot(
            "routes:\n  - domain: a.example.com\n    target: http://127.0.0.1:9000\n",
        );
        assert!(matches!(
            resolve(&snap, "A.Example.COM", "/"),
            ResolveOutcome::Matched { .. }
        ));
    }
}
