//! # Config Store
//!
//! Parses the three layered YAML files (`main.yaml`, `proxy.yaml`,
//! `processes.yaml`), applies `${VAR}` substitution, validates cross-file
//! invariants, and publishes the result as an atomically-swappable
//! [`snapshot::ConfigSnapshot`] (§3, §4.1, §4.2, §6).

pub mod main_config;
pub mod process_config;
pub mod proxy_config;
pub mod reload;
pub mod route;
pub mod snapshot;
pub mod store;

pub use main_config::MainConfig;
pub use process_config::{ProcessConfig, ProcessesFile};
pub use proxy_config::ProxyConfig;
pub use route::Route;
pub use snapshot::ConfigSnapshot;
pub use store::{ConfigPathSet, ConfigStore};
