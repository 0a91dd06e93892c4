//! `proxy.yaml` — listener ports, routing table, TLS/ACME, and the
//! request-level security knobs (rate limiting, session store) that aren't
//! per-route (§3, §6).

use serde::Deserialize;
use std::path::PathBuf;

use super::route::Route;

fn default_http_port() -> u16 {
    8080
}

fn default_https_port() -> u16 {
    8443
}

fn default_rate_limit_window_ms() -> u64 {
    900_000
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_session_cache_capacity() -> usize {
    100
}

fn default_session_id_bytes() -> usize {
    32
}

fn default_renewal_threshold_days() -> i64 {
    30
}

/// ACME / Let's Encrypt settings (§1, §4.10 — `ensureCertificate` collaborator).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetsEncryptConfig {
    /// Whether automatic certificate issuance/renewal is enabled at all.
    #[serde(default)]
    pub enabled: bool,
    /// Contact email registered with the ACME account.
    pub email: Option<String>,
    /// Use the staging directory instead of production (testing).
    #[serde(default)]
    pub staging: bool,
    /// Days before expiry at which renewal is requested (§4.10).
    #[serde(default = "default_renewal_threshold_days")]
    pub renewal_threshold_days: i64,
}

impl Default for LetsEncryptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email: None,
            staging: false,
            renewal_threshold_days: default_renewal_threshold_days(),
        }
    }
}

/// Access-log settings (§4.8 is per-process logging; this is the request log).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyLoggingConfig {
    /// `tracing` env-filter directive (e.g. `"info"`, `"debug,tower_http=warn"`).
    /// Overridden at runtime by the `LOG_LEVEL` environment variable (§6).
    pub level: Option<String>,
    /// Path of the rolling application log file. Overridden by `LOG_FILE`
    /// (§6). `None` logs to stdout only.
    pub file: Option<PathBuf>,
    /// Emit one structured record per dispatched request.
    #[serde(default)]
    pub access_log: bool,
    /// Log unmatched (404) requests too, not just dispatched ones.
    #[serde(default)]
    pub log_unmatched: bool,
}

/// Fixed-window rate limiter settings (§4.5).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Window size in milliseconds. `0` disables rate limiting entirely (§4.5).
    #[serde(default = "default_rate_limit_window_ms")]
    pub window_ms: u64,
    /// Maximum requests per `(route, client IP)` within the window.
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_rate_limit_window_ms(),
            max_requests: default_rate_limit_max(),
        }
    }
}

/// Session Gate storage and sizing (§4.9).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// In-memory LRU cache capacity in front of the persistent store (§4.9).
    #[serde(default = "default_session_cache_capacity")]
    pub cache_capacity: usize,
    /// Session id entropy in bytes; must yield at least 256 bits (§4.9 invariant).
    #[serde(default = "default_session_id_bytes")]
    pub id_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_session_cache_capacity(),
            id_bytes: default_session_id_bytes(),
        }
    }
}

/// Global security knobs that apply across all routes unless overridden (§4.4, §4.7).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Rate limiter.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Session gate.
    #[serde(default)]
    pub session: SessionConfig,
    /// Base Content-Security-Policy directives applied to every route before
    /// any per-route `csp` overlay (§9).
    #[serde(default)]
    pub csp: Vec<String>,
    /// Allow-list of hosts the Dynamic Forward Proxy may target; empty means
    /// "reject all forward requests" (§4.6 default-closed invariant).
    #[serde(default)]
    pub forward_allow_list: Vec<String>,
}

/// Top-level `proxy.yaml` document (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Plain HTTP listener port.
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// TLS listener port.
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    /// Routing table (§3, §4.3). Order is significant for prefix tie-breaks.
    #[serde(default)]
    pub routes: Vec<Route>,
    /// ACME/Let's Encrypt integration.
    #[serde(default)]
    pub lets_encrypt: LetsEncryptConfig,
    /// Request logging.
    #[serde(default)]
    pub logging: ProxyLoggingConfig,
    /// Security knobs (rate limit, session, CSP, forward allow-list).
    #[serde(default)]
    pub security: SecurityConfig,
    /// Legacy single-file layout: processes embedded directly in proxy.yaml
    /// instead of a separate `processes.yaml` referenced from `main.yaml`
    /// (§6 notes both layouts are accepted).
    pub process_config_file: Option<PathBuf>,
}

impl ProxyConfig {
    /// Validates every route's dispatch-kind invariant (§3) and that the
    /// forward-proxy allow-list isn't accidentally left wide open by a
    /// wildcard entry combined with `enabled` routes of kind `forward`.
    pub fn validate(&self) -> Result<(), String> {
        for route in &self.routes {
            route.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_absent() {
        let yaml = "routes: []\n";
        let c: ProxyConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.https_port, 8443);
        assert_eq!(c.security.rate_limit.window_ms, 900_000);
        assert!(c.security.forward_allow_list.is_empty());
    }

    #[test]
    fn zero_window_disables_rate_limit_by_convention() {
        let yaml = "security:\n  rateLimit:\n    windowMs: 0\n    maxRequests: 0\n";
        let c: ProxyConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(c.security.rate_limit.window_ms, 0);
    }

    #[test]
    fn invalid_route_fails_top_level_validate() {
        let yaml = "routes:\n  - domain: a.example.com\n    type: proxy\n";
        let c: ProxyConfig = serde_yml::from_str(yaml).unwrap();
        assert!(c.validate().is_err());
    }
}
