//! `main.yaml` — management listener, config file locations, and the
//! settings shared by the rest of the gateway (§6).

use serde::Deserialize;
use std::path::PathBuf;

fn default_management_port() -> u16 {
    // port + 1000 is applied after proxy.yaml is known to be loaded; this is
    // the fallback used when main.yaml is read standalone (e.g. `--create-config`).
    1080
}

fn default_session_timeout_ms() -> u64 {
    1_800_000
}

fn default_statistics_retention_days() -> u32 {
    30
}

fn default_cache_max_age_secs() -> u64 {
    3600
}

fn default_cache_cleanup_interval_secs() -> u64 {
    300
}

/// Top-level `main.yaml` document (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainConfig {
    /// Management listener and admin-console settings.
    #[serde(default)]
    pub management: ManagementConfig,
    /// Paths to the other two layered config files.
    #[serde(default)]
    pub config: ConfigPaths,
    /// Shared runtime directories and collaborator settings.
    #[serde(default)]
    pub settings: Settings,
    /// Development-time toggles.
    #[serde(default)]
    pub development: DevelopmentConfig,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            management: ManagementConfig::default(),
            config: ConfigPaths::default(),
            settings: Settings::default(),
            development: DevelopmentConfig::default(),
        }
    }
}

/// Management listener (`main.management`, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementConfig {
    /// Management listener port; defaults to `port + 1000` once proxy.yaml's
    /// `port` is known (applied by the config store after both files load).
    #[serde(default = "default_management_port")]
    pub port: u16,
    /// Management listener bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Optional admin console password. `None` disables the admin console's
    /// auth gate entirely — the operator is expected to firewall the port.
    pub admin_password: Option<String>,
    /// Session idle timeout in milliseconds (§4.9).
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout: u64,
    /// CORS settings for the management API; `true` applies defaults (§4.1).
    #[serde(default)]
    pub cors: CorsSetting,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            port: default_management_port(),
            host: default_host(),
            admin_password: None,
            session_timeout: default_session_timeout_ms(),
            cors: CorsSetting::default(),
        }
    }
}

/// CORS configuration: either a bare boolean (apply documented defaults) or
/// a fully-specified object (§4.1 schema rules).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CorsSetting {
    /// `true` = apply defaults, `false` = disabled.
    Enabled(bool),
    /// Fully-specified CORS policy.
    Detailed(CorsConfig),
}

impl Default for CorsSetting {
    fn default() -> Self {
        CorsSetting::Enabled(false)
    }
}

/// Explicit CORS policy.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    /// Allowed origins; empty means "mirror the request's Origin" (permissive).
    #[serde(default)]
    pub origins: Vec<String>,
    /// Allowed methods; defaults to GET/HEAD/PUT/PATCH/POST/DELETE (§4.1).
    #[serde(default = "default_cors_methods")]
    pub methods: Vec<String>,
    /// Allowed request headers.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Whether credentials (cookies, auth headers) are allowed cross-origin.
    #[serde(default)]
    pub credentials: bool,
}

/// Default CORS methods per §4.1 schema rules.
pub fn default_cors_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Paths to the proxy and process config files (`main.config`, §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPaths {
    /// Path to `proxy.yaml`.
    #[serde(default = "default_proxy_path")]
    pub proxy: PathBuf,
    /// Path to `processes.yaml`. Overridden by `proxy.yaml`'s own
    /// `processConfigFile` when the legacy single-file layout is used (§6).
    pub processes: Option<PathBuf>,
}

fn default_proxy_path() -> PathBuf {
    PathBuf::from("proxy.yaml")
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            proxy: default_proxy_path(),
            processes: None,
        }
    }
}

/// Shared runtime directories and ambient collaborator settings (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Root data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Application log directory (distinct from per-process log files, §4.8).
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Root of the `${certDir}/${domain}/{cert.pem,key.pem}` layout (§4.10).
    #[serde(default = "default_certificates_dir")]
    pub certificates_dir: PathBuf,
    /// Scratch directory for transient files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Statistics sink storage directory (collaborator, §1).
    #[serde(default = "default_stats_dir")]
    pub stats_dir: PathBuf,
    /// Cache store directory (collaborator, §1).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Config/session backup directory.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    /// Statistics sink behaviour.
    #[serde(default)]
    pub statistics: StatisticsSettings,
    /// Cache store behaviour.
    #[serde(default)]
    pub cache: CacheSettings,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_logs_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_certificates_dir() -> PathBuf {
    PathBuf::from("./certificates")
}
fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}
fn default_stats_dir() -> PathBuf {
    PathBuf::from("./data/stats")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache")
}
fn default_backup_dir() -> PathBuf {
    PathBuf::from("./data/backup")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            logs_dir: default_logs_dir(),
            certificates_dir: default_certificates_dir(),
            temp_dir: default_temp_dir(),
            stats_dir: default_stats_dir(),
            cache_dir: default_cache_dir(),
            backup_dir: default_backup_dir(),
            statistics: StatisticsSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

/// Statistics collaborator toggle and retention policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSettings {
    /// Whether recorded statistics are persisted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Backup interval in milliseconds.
    #[serde(default = "default_cache_max_age_secs")]
    pub backup_interval: u64,
    /// Days to retain statistics records.
    #[serde(default = "default_statistics_retention_days")]
    pub retention_days: u32,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backup_interval: default_cache_max_age_secs(),
            retention_days: default_statistics_retention_days(),
        }
    }
}

/// Cache collaborator toggle and sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    /// Whether the cache collaborator is active.
    #[serde(default)]
    pub enabled: bool,
    /// Default max-age in seconds for cached entries.
    #[serde(default = "default_cache_max_age_secs")]
    pub max_age: u64,
    /// Maximum cache size in bytes.
    pub max_size: Option<u64>,
    /// Cleanup sweep interval in seconds.
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cleanup_interval: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age: default_cache_max_age_secs(),
            max_size: None,
            cleanup_interval: default_cache_cleanup_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Development-time toggles (`main.development`, §6).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentConfig {
    /// Enables verbose debug logging.
    #[serde(default)]
    pub debug: bool,
    /// Enables extra-verbose request tracing.
    #[serde(default)]
    pub verbose: bool,
    /// Enables the file-watcher-driven hot reload pipeline (§4.2). This is
    /// independent of the `DISABLE_CONFIG_WATCH` / `--no-watch` opt-out,
    /// which takes precedence when set.
    #[serde(default = "default_true")]
    pub hot_reload: bool,
}
