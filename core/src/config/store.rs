//! The Config Store (§4.1): loads the three layered YAML files, applies
//! `${VAR}` substitution, validates, and publishes immutable
//! [`ConfigSnapshot`]s behind an [`ArcSwap`] so readers never block a writer
//! and never observe a half-applied reload.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::ConfigError;
use crate::util::envsubst;

use super::main_config::MainConfig;
use super::process_config::{ProcessConfig, ProcessesFile};
use super::proxy_config::ProxyConfig;
use super::snapshot::ConfigSnapshot;

/// Resolved on-disk locations of the three config files, pinned at startup
/// from `--config`/`MAIN_CONFIG` and `main.yaml`'s own `config` section (§6).
#[derive(Debug, Clone)]
pub struct ConfigPathSet {
    pub main: PathBuf,
    pub proxy: PathBuf,
    pub processes: Option<PathBuf>,
}

/// Reads `path`, substitutes `${VAR}` against the process environment, and
/// parses the result as YAML into `T` (§4.1, §9 — substitution is total;
/// unresolved placeholders are preserved and caught later by
/// route-specific validation rather than failing the parse itself).
fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let env_vars: HashMap<String, String> = env::vars().collect();
    let substituted = envsubst::substitute(&raw, &env_vars);
    serde_yml::from_str(&substituted).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Applies the §6 environment-variable overrides on top of whatever the YAML
/// files said. These are distinct from `${VAR}` substitution (§4.1): they
/// replace specific fields outright rather than interpolating into strings,
/// and take effect on every load, including reloads.
fn apply_env_overrides(main: &mut MainConfig, proxy: &mut ProxyConfig) {
    if let Ok(v) = env::var("PORT") {
        if let Ok(port) = v.parse() {
            proxy.port = port;
        }
    }
    if let Ok(v) = env::var("HTTPS_PORT") {
        if let Ok(port) = v.parse() {
            proxy.https_port = port;
        }
    }
    if let Ok(v) = env::var("LETSENCRYPT_EMAIL") {
        proxy.lets_encrypt.email = Some(v);
    }
    if let Ok(v) = env::var("LETSENCRYPT_STAGING") {
        proxy.lets_encrypt.staging = v == "true";
    }
    if let Ok(v) = env::var("CERT_DIR") {
        main.settings.certificates_dir = PathBuf::from(v);
    }
    if let Ok(v) = env::var("LOG_LEVEL") {
        proxy.logging.level = Some(v);
    }
    if let Ok(v) = env::var("LOG_FILE") {
        proxy.logging.file = Some(PathBuf::from(v));
    }
    if let Ok(v) = env::var("RATE_LIMIT_WINDOW_MS") {
        if let Ok(ms) = v.parse() {
            proxy.security.rate_limit.window_ms = ms;
        }
    }
    if let Ok(v) = env::var("RATE_LIMIT_MAX_REQUESTS") {
        if let Ok(max) = v.parse() {
            proxy.security.rate_limit.max_requests = max;
        }
    }
}

/// Loads and cross-validates the three config files into a single
/// [`ConfigSnapshot`] (without yet assigning a generation number).
pub fn load_snapshot_parts(
    paths: &ConfigPathSet,
) -> Result<(MainConfig, ProxyConfig, HashMap<String, ProcessConfig>), ConfigError> {
    let mut main: MainConfig = load_yaml(&paths.main)?;
    let mut proxy: ProxyConfig = load_yaml(&paths.proxy)?;
    apply_env_overrides(&mut main, &mut proxy);

    proxy
        .validate()
        .map_err(ConfigError::Validation)?;

    for route in &proxy.routes {
        if route.require_auth {
            if let Some(oauth2) = &route.oauth2 {
                for (field, value) in [
                    ("clientId", &oauth2.client_id),
                    ("clientSecret", &oauth2.client_secret),
                    ("callbackUrl", &oauth2.callback_url),
                ] {
                    if envsubst::has_unresolved_placeholder(value) {
                        return Err(ConfigError::UnresolvedEnvironmentVariable {
                            route: route.domain.clone(),
                            field: field.to_string(),
                        });
                    }
                }
            }
        }
    }

    let processes_path = proxy
        .process_config_file
        .clone()
        .or_else(|| paths.processes.clone());

    let processes = match processes_path {
        Some(p) if p.exists() => {
            let file: ProcessesFile = load_yaml(&p)?;
            file.processes
        }
        Some(_) | None => HashMap::new(),
    };

    Ok((main, proxy, processes))
}

/// Holds the currently-published [`ConfigSnapshot`] and hands out cheap
/// `Arc` clones to readers; swapped atomically by the Reload Coordinator.
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
    generation: AtomicU64,
    paths: ConfigPathSet,
}

impl ConfigStore {
    /// Performs the initial, fatal-on-error load (§4.1 "first load is fatal").
    pub fn load(paths: ConfigPathSet) -> Result<Self, ConfigError> {
        let (main, proxy, processes) = load_snapshot_parts(&paths)?;
        let snapshot = ConfigSnapshot::new(main, proxy, processes, 1);
        Ok(Self {
            current: ArcSwap::new(snapshot),
            generation: AtomicU64::new(1),
            paths,
        })
    }

    /// Returns a cheap handle to the snapshot active right now. Callers
    /// should hold this for the lifetime of one request, not re-fetch
    /// mid-request (§4.2 atomicity invariant).
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn paths(&self) -> &ConfigPathSet {
        &self.paths
    }

    /// Re-reads all three files and publishes a new snapshot atomically.
    /// On any error the previous snapshot remains live (§4.2).
    pub fn reload(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let (main, proxy, processes) = load_snapshot_parts(&self.paths)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = ConfigSnapshot::new(main, proxy, processes, generation);
        self.current.store(snapshot.clone());
        Ok(snapshot)
    }
}
