//! The atomically-published [`ConfigSnapshot`] (§4.1, §4.2).
//!
//! A snapshot is the immutable, fully-resolved (env-substituted, validated)
//! union of `main.yaml` + `proxy.yaml` + `processes.yaml` at one point in
//! time. Every in-flight request borrows one snapshot for its whole
//! lifetime via `ArcSwap::load()`, so a reload can never hand a single
//! request a mix of old and new routes (§4.2 invariant).

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::main_config::MainConfig;
use super::process_config::ProcessConfig;
use super::proxy_config::ProxyConfig;
use super::route::Route;

/// A fully loaded and validated configuration, ready to be swapped in as the
/// gateway's active state.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub main: MainConfig,
    pub proxy: ProxyConfig,
    pub processes: HashMap<String, ProcessConfig>,
    /// Monotonically increasing generation counter, bumped on every reload.
    /// Surfaced on the management API and in reload log lines (§4.2).
    pub generation: u64,
}

impl ConfigSnapshot {
    pub fn new(
        main: MainConfig,
        proxy: ProxyConfig,
        processes: HashMap<String, ProcessConfig>,
        generation: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            main,
            proxy,
            processes,
            generation,
        })
    }

    /// Routes defined for `domain`, in declaration order (§4.3 resolution
    /// walks this list looking for the longest matching prefix).
    pub fn routes_for_domain<'a>(&'a self, domain: &str) -> impl Iterator<Item = &'a Route> {
        self.proxy
            .routes
            .iter()
            .filter(move |r| r.domain.eq_ignore_ascii_case(domain))
    }

    /// A redacted view safe to serialize onto the management API (§1, §6 —
    /// `adminPassword` and OAuth2 client secrets are never exposed).
    pub fn sanitized(&self) -> SanitizedSnapshot {
        SanitizedSnapshot::from(self)
    }
}

/// Secret-free projection of a [`ConfigSnapshot`] for the management console.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedSnapshot {
    pub generation: u64,
    pub port: u16,
    pub https_port: u16,
    pub management_port: u16,
    pub admin_password_set: bool,
    pub routes: Vec<SanitizedRoute>,
    pub process_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedRoute {
    pub domain: String,
    pub path: Option<String>,
    pub kind: &'static str,
    pub require_auth: bool,
    pub has_oauth2: bool,
}

impl From<&ConfigSnapshot> for SanitizedSnapshot {
    fn from(s: &ConfigSnapshot) -> Self {
        let mut process_ids: Vec<String> = s.processes.keys().cloned().collect();
        process_ids.sort();
        Self {
            generation: s.generation,
            port: s.proxy.port,
            https_port: s.proxy.https_port,
            management_port: s.main.management.port,
            admin_password_set: s.main.management.admin_password.is_some(),
            routes: s
                .proxy
                .routes
                .iter()
                .map(|r| SanitizedRoute {
                    domain: r.domain.clone(),
                    path: r.path.clone(),
                    kind: match r.kind {
                        super::route::RouteKind::Proxy => "proxy",
                        super::route::RouteKind::Static => "static",
                        super::route::RouteKind::Redirect => "redirect",
                        super::route::RouteKind::Forward => "forward",
                    },
                    require_auth: r.require_auth,
                    has_oauth2: r.oauth2.is_some(),
                })
                .collect(),
            process_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> Arc<ConfigSnapshot> {
        ConfigSnapshot::new(
            MainConfig::default(),
            serde_yml::from_str("routes: []\n").unwrap(),
            HashMap::new(),
            1,
        )
    }

    #[test]
    fn sanitized_never_exposes_admin_password() {
        let mut snap = (*empty_snapshot()).clone();
        snap.main.management.admin_password = Some("super-secret".to_string());
        let sanitized = snap.sanitized();
        assert!(sanitized.admin_password_set);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
