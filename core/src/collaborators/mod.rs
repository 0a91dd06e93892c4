//! # External Collaborators
//!
//! Narrow trait contracts for the systems named by the spec but explicitly
//! out of scope for a deep implementation here (§1): ACME certificate
//! issuance, OAuth2 authorization, the statistics sink, and the cache
//! store. The gateway depends only on these interfaces; a full deployment
//! supplies real implementations (an ACME client, a provider's OAuth2
//! endpoints, a metrics backend, a cache backend).

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::Route;

/// Certificate issuance/renewal collaborator (§1, §4.10).
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Ensures a valid certificate exists for `domain`, issuing or renewing
    /// one if the stored certificate is absent or within the renewal
    /// threshold of expiry. Returns once the certificate on disk is usable.
    async fn ensure_certificate(&self, domain: &str) -> anyhow::Result<()>;
}

/// A `CertificateAuthority` that does nothing; used when Let's Encrypt
/// integration is disabled (§6 `letsEncrypt.enabled = false`).
pub struct NoCertificateAuthority;

#[async_trait]
impl CertificateAuthority for NoCertificateAuthority {
    async fn ensure_certificate(&self, _domain: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// OAuth2 authorization-code flow collaborator (§4.4 AUTH-GATED, §6).
/// OAuth2 is configured per-route (`Route::oauth2`); the provider uses the
/// requesting route's client id/secret/endpoints to build and resolve the
/// flow.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    /// Builds the provider authorization URL the caller should be
    /// redirected to, so that on success the provider returns the browser
    /// to `return_path` on this gateway (§6 `beginAuthorization`).
    fn begin_authorization(&self, route: &Route, return_path: &str) -> String;

    /// Exchanges the callback `query` string for the subject identity
    /// string stored on the resulting session (§6 `handleCallback`).
    async fn handle_callback(&self, route: &Route, query: &str) -> anyhow::Result<String>;
}

/// One recorded request outcome (§1, §6 statistics collaborator).
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub route_domain: Option<String>,
    pub path: String,
    pub status: u16,
    pub client_ip: IpAddr,
    pub duration_ms: u64,
}

/// Statistics sink collaborator (§1, §6 `settings.statistics`).
pub trait StatisticsSink: Send + Sync {
    fn record(&self, record: RequestRecord);
}

/// A `StatisticsSink` that discards everything; used when
/// `settings.statistics.enabled` is false.
pub struct NullStatisticsSink;

impl StatisticsSink for NullStatisticsSink {
    fn record(&self, _record: RequestRecord) {}
}

/// Response cache collaborator (§1, §6 `settings.cache`).
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn put(&self, key: &str, value: Vec<u8>, max_age_secs: u64);
}

/// A `CacheStore` that never hits and discards every write; used when
/// `settings.cache.enabled` is false.
pub struct NullCacheStore;

impl CacheStore for NullCacheStore {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _value: Vec<u8>, _max_age_secs: u64) {}
}
