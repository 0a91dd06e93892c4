//! # gateway_core
//!
//! Route dispatch and process supervision fabric for a self-hosting reverse
//! proxy: configuration loading and hot reload, route resolution, the
//! per-request dispatch state machine, the upstream and dynamic-forward
//! proxy engines, TLS termination, rate limiting and filters, the session
//! gate, and the detached-child process supervisor.
//!
//! The HTTP/HTTPS/management listeners, CLI, and signal handling live in
//! the `gatewayd` binary crate; this crate is the part with state machines
//! worth testing in isolation.

pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod filters;
pub mod logging;
pub mod proxy;
pub mod ratelimit;
pub mod routing;
pub mod session;
pub mod supervisor;
pub mod tls;
pub mod util;

pub use config::{ConfigPathSet, ConfigSnapshot, ConfigStore, MainConfig, ProxyConfig, Route};
pub use dispatch::{DispatchOutcome, DispatchRequest, DispatchResponse, Dispatcher};
pub use errors::{ConfigError, GatewayError, SupervisorError};
pub use supervisor::Supervisor;
