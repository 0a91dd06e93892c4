//! The `Route` data model (§3) and its YAML schema quirks: rewrite rules
//! must preserve declaration order even though YAML mappings are otherwise
//! unordered in general, and several fields accept either a bare boolean or
//! a detailed object (§4.1 schema rules).

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

use super::main_config::{default_cors_methods, CorsConfig, CorsSetting};

/// Dispatch kind for a route (§3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// Reverse-proxy to a fixed upstream URL.
    Proxy,
    /// Serve a static file tree.
    Static,
    /// Issue a fixed redirect.
    Redirect,
    /// Dynamic forward proxy to a caller-supplied URL (§4.6).
    Forward,
}

impl Default for RouteKind {
    fn default() -> Self {
        RouteKind::Proxy
    }
}

/// An ordered sequence of `(pattern, replacement)` rewrite rules (§3).
///
/// Declared in YAML as a mapping (`rewrite: {"^/api/": "/v1/"}`), but unlike
/// a `HashMap` the order in which keys appear in the document is load-bearing
/// (§4.4 step REWRITTEN: "apply rewrite rules in order"). A custom
/// `Deserialize` implementation collects entries via `MapAccess` in document
/// order instead of routing through an unordered map type.
#[derive(Debug, Clone, Default)]
pub struct RewriteRules(pub Vec<(String, String)>);

impl<'de> Deserialize<'de> for RewriteRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedMapVisitor;

        impl<'de> Visitor<'de> for OrderedMapVisitor {
            type Value = RewriteRules;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of regex pattern to replacement, in order")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut rules = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((k, v)) = map.next_entry::<String, String>()? {
                    rules.push((k, v));
                }
                Ok(RewriteRules(rules))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(RewriteRules(Vec::new()))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor)
    }
}

/// Per-route CORS override; same boolean-or-object shape as the management
/// listener's CORS setting (§4.1).
pub type RouteCors = CorsSetting;

/// Geolocation filter decision policy for a route (§4.4, §4.7).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationFilter {
    /// Allowed ISO country codes; empty means "no allow-list restriction".
    #[serde(default)]
    pub allow_countries: Vec<String>,
    /// Blocked ISO country codes, checked after the allow-list.
    #[serde(default)]
    pub block_countries: Vec<String>,
    /// Policy applied when the client's country cannot be determined (§4.7).
    #[serde(default = "default_unknown_policy")]
    pub unknown: UnknownGeoPolicy,
    /// Optional custom block response.
    pub block_status: Option<u16>,
    /// Optional custom block message.
    pub block_message: Option<String>,
    /// Optional redirect-on-block target, takes precedence over `block_status`.
    pub block_redirect: Option<String>,
}

/// What to do when a client's country cannot be resolved (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownGeoPolicy {
    /// Treat as allowed (the documented default).
    Allow,
    /// Treat as blocked.
    Block,
}

fn default_unknown_policy() -> UnknownGeoPolicy {
    UnknownGeoPolicy::Allow
}

/// OAuth2 configuration attached to a route that requires auth (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Config {
    /// OAuth2 client id; may still contain `${VAR}` placeholders pending
    /// substitution (§4.1 — fatal at startup if unresolved once the route
    /// with `requireAuth = true` is activated).
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Callback URL registered with the provider.
    pub callback_url: String,
    /// Authorization endpoint base URL.
    pub authorization_url: String,
    /// Token exchange endpoint base URL.
    pub token_url: String,
    /// Scopes requested at authorization time.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// A single routing rule (§3).
///
/// Invariant: exactly one dispatch `kind`, and the field that kind requires
/// (`target` for proxy/redirect, `static_path` for static, nothing for
/// forward) is present — enforced by [`Route::validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Routing domain (hostname); wildcards not required (§3).
    pub domain: String,
    /// Optional path prefix; absent means "matches any path on the domain"
    /// (lowest match priority, §4.3).
    pub path: Option<String>,
    /// Dispatch kind; defaults to `proxy` (§4.1 schema rules).
    #[serde(default, rename = "type")]
    pub kind: RouteKind,
    /// Upstream URL (proxy), destination URL (redirect), or directory
    /// (static, via `static_path`). Ignored for `forward`.
    pub target: Option<String>,
    /// Directory to serve for `static` routes.
    pub static_path: Option<String>,
    /// Serve `index.html` for any path with no matching file (§8 scenario 3).
    #[serde(default)]
    pub spa_fallback: bool,
    /// Ordered rewrite rules applied to the request path (§4.4 REWRITTEN).
    #[serde(default)]
    pub rewrite: RewriteRules,
    /// Headers injected into the response after rewriting, before dispatch
    /// (§4.4 tie-breaks).
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Whether this route requires TLS (informational; actual termination
    /// is driven by the listener + TLS Termination component, §4.10).
    #[serde(default)]
    pub ssl: bool,
    /// Per-route Content-Security-Policy directives, overlaid onto the
    /// global policy (§9 open question: overlay semantics are merge-by
    /// concatenation with de-duplication by directive name — see DESIGN.md).
    pub csp: Option<Vec<String>>,
    /// Per-route CORS override.
    pub cors: Option<RouteCors>,
    /// Geolocation allow/block policy (§4.4 FILTERED).
    pub geolocation: Option<GeolocationFilter>,
    /// OAuth2 configuration, required when `require_auth` is true and no
    /// server-wide default is configured.
    pub oauth2: Option<OAuth2Config>,
    /// Whether this route requires a valid session (§4.4 AUTH-GATED).
    #[serde(default)]
    pub require_auth: bool,
    /// Path prefixes exempt from the auth gate even when `require_auth` is
    /// true. Empty + `require_auth = true` ⇒ every request redirects (§8).
    #[serde(default)]
    pub public_paths: Vec<String>,
    /// Redirect status code override (default 301, §4.4 DISPATCHED).
    pub redirect_status: Option<u16>,
    /// Name of the process (by convention of §9) this route is expected to
    /// proxy to, when it corresponds to a managed process. Purely advisory:
    /// the actual dispatch target is always `target`.
    pub process: Option<String>,
}

impl Route {
    /// Validates the "exactly one kind, required target present" invariant (§3).
    pub fn validate(&self) -> Result<(), String> {
        match self.kind {
            RouteKind::Proxy | RouteKind::Redirect => {
                if self.target.is_none() {
                    return Err(format!(
                        "route {}{}: {:?} requires `target`",
                        self.domain,
                        self.path.as_deref().unwrap_or(""),
                        self.kind
                    ));
                }
            }
            RouteKind::Static => {
                if self.static_path.is_none() {
                    return Err(format!(
                        "route {}{}: static requires `staticPath`",
                        self.domain,
                        self.path.as_deref().unwrap_or("")
                    ));
                }
            }
            RouteKind::Forward => {}
        }
        Ok(())
    }

    /// Longest-proper-prefix match length used by the Route Resolver (§4.3).
    /// Returns `None` if this route's `path` is not a prefix of `request_path`.
    pub fn prefix_len(&self, request_path: &str) -> Option<usize> {
        match &self.path {
            None => Some(0),
            Some(p) if request_path.starts_with(p.as_str()) => Some(p.len()),
            Some(_) => None,
        }
    }

    /// Resolves the effective CORS methods for an `OPTIONS` preflight (§4.4).
    pub fn cors_methods(&self) -> Vec<String> {
        match &self.cors {
            Some(CorsSetting::Detailed(CorsConfig { methods, .. })) if !methods.is_empty() => {
                methods.clone()
            }
            _ => default_cors_methods(),
        }
    }

    /// True if CORS is enabled at all for this route (§4.4 OPTIONS short-circuit).
    pub fn cors_enabled(&self) -> bool {
        matches!(
            &self.cors,
            Some(CorsSetting::Enabled(true)) | Some(CorsSetting::Detailed(_))
        )
    }
}
