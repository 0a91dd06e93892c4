//! Command-line surface (§6): `--config`, `--create-config`, `--no-watch`.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "gatewayd",
    version,
    author = "ckir",
    about = "Self-hosting reverse proxy and process supervisor."
)]
pub struct Cli {
    /// Path to main.yaml. Falls back to `MAIN_CONFIG_FILE`, then `CONFIG_FILE`,
    /// then `./main.yaml` (§6).
    #[clap(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write an example proxy.yaml to PATH and exit 0 without starting the
    /// gateway (§6).
    #[clap(long, value_name = "PATH")]
    pub create_config: Option<PathBuf>,

    /// Disable the config file watcher / hot reload pipeline. Also settable
    /// via `DISABLE_CONFIG_WATCH=true` (§6).
    #[clap(long)]
    pub no_watch: bool,
}

/// Resolves the main config path per §6's documented precedence.
pub fn resolve_main_config_path(cli: &Cli) -> PathBuf {
    if let Some(p) = &cli.config {
        return p.clone();
    }
    if let Ok(p) = std::env::var("MAIN_CONFIG_FILE") {
        return PathBuf::from(p);
    }
    if let Ok(p) = std::env::var("CONFIG_FILE") {
        return PathBuf::from(p);
    }
    PathBuf::from("main.yaml")
}

/// Whether file watching should be disabled, combining the CLI flag and its
/// environment-variable equivalent (§6).
pub fn watch_disabled(cli: &Cli) -> bool {
    cli.no_watch || std::env::var("DISABLE_CONFIG_WATCH").map(|v| v == "true").unwrap_or(false)
}

/// The example `proxy.yaml` written by `--create-config` (§6).
pub const EXAMPLE_PROXY_YAML: &str = r#"port: 8080
httpsPort: 8443
routes:
  - domain: example.com
    type: proxy
    target: http://127.0.0.1:9000
    rewrite:
      "^/api/": "/v1/"
letsEncrypt:
  enabled: false
  email: admin@example.com
logging:
  level: info
security:
  rateLimit:
    windowMs: 900000
    maxRequests: 100
"#;
