//! # Error Taxonomy
//!
//! Request-scoped and control-plane error kinds (§7). Request-scoped errors
//! carry enough information to be turned directly into an HTTP response by
//! the dispatcher; control-plane errors (config, supervisor) are surfaced to
//! logs and never reach a client directly.

use thiserror::Error;

/// Errors that can terminate a single request's journey through the dispatcher.
///
/// Each variant maps to exactly one HTTP status per §4.4 / §7; the mapping
/// lives in `GatewayError::status_code` rather than being duplicated at each
/// call site.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No route matched `(host, path, method)`.
    #[error("no route matched this request")]
    NoRouteMatched,

    /// The geolocation filter blocked the request.
    #[error("request blocked by geolocation filter")]
    GeoBlocked {
        /// Optional operator-configured status code override.
        status: Option<u16>,
        /// Optional operator-configured response body.
        message: Option<String>,
    },

    /// The per-(route, client-IP) rate bucket is over its limit.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the window resets, used for `Retry-After`.
        retry_after_secs: u64,
    },

    /// Route requires an authenticated session and none was found.
    #[error("authentication required")]
    AuthRequired {
        /// Where to redirect a browser client.
        redirect_url: String,
        /// Whether the caller looks like a browser (controls 302 vs 401).
        is_browser: bool,
    },

    /// Upstream connection could not be established.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream did not respond within the configured timeout.
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// Upstream violated the HTTP protocol or closed mid-response.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocolError(String),

    /// Dynamic forward-proxy target was missing, malformed, or disallowed.
    #[error("forward proxy target rejected: {0}")]
    ForwardTargetRejected(String),

    /// Any other internal error; logged and surfaced as a 500 without crashing
    /// the process (§7, "Unexpected internal error").
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// The HTTP status code this error should be rendered as (§4.4, §7).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NoRouteMatched => 404,
            GatewayError::GeoBlocked { status, .. } => status.unwrap_or(403),
            GatewayError::RateLimited { .. } => 429,
            GatewayError::AuthRequired { is_browser, .. } => {
                if *is_browser {
                    302
                } else {
                    401
                }
            }
            GatewayError::UpstreamUnavailable(_) => 502,
            GatewayError::UpstreamTimeout => 504,
            GatewayError::UpstreamProtocolError(_) => 502,
            GatewayError::ForwardTargetRejected(reason) => {
                if reason.contains("disallowed") {
                    403
                } else {
                    400
                }
            }
            GatewayError::Internal(_) => 500,
        }
    }
}

/// Errors raised while loading or validating configuration (§4.1, §7).
///
/// At initial startup these are fatal; on reload the Reload Coordinator
/// catches them and retains the previous snapshot (§4.2).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A referenced file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be parsed as YAML.
    #[error("failed to parse {path} as YAML: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_yml::Error,
    },

    /// A structural validation rule was violated (§3, §4.1 schema rules).
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// An OAuth2-bearing route still has an unresolved `${VAR}` placeholder
    /// in `clientId`, `clientSecret`, or `callbackUrl` (§4.1, §9).
    #[error("unresolved environment variable in OAuth2 config for route {route}: {field}")]
    UnresolvedEnvironmentVariable {
        /// Name of the offending route.
        route: String,
        /// Field that still contains a `${...}` placeholder.
        field: String,
    },
}

/// Errors raised by the process supervisor's lifecycle operations (§4.8, §7).
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Spawning the child process failed; the process is marked in-error and
    /// is not retried automatically, since the configuration is presumed wrong.
    #[error("failed to spawn process {id}: {source}")]
    SpawnFailed {
        /// Process identifier.
        id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The PID file could not be written atomically.
    #[error("failed to write pid file {path}: {source}")]
    PidFileWrite {
        /// Path of the PID file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No such managed process id is known to the supervisor.
    #[error("unknown process id: {0}")]
    UnknownProcess(String),
}
