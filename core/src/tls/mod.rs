//! # TLS Termination
//!
//! Loads per-domain certificate material from
//! `${certificatesDir}/${domain}/{cert.pem,key.pem}` (§4.10), resolves the
//! right certificate by SNI with no default-certificate fallback (an SNI
//! miss is a TLS handshake failure, not a silent wildcard match), and
//! tracks expiry so the Reload Coordinator can signal the ACME collaborator
//! when a certificate is within its renewal threshold.

use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use x509_parser::prelude::*;

/// Parsed validity window of a leaf certificate (§3 "Certificate Material").
#[derive(Debug, Clone, Copy)]
pub struct CertValidity {
    pub not_before_unix: i64,
    pub not_after_unix: i64,
}

impl CertValidity {
    /// True when `not_after` is within `threshold_days` of `now_unix` (§4.10).
    pub fn needs_renewal(&self, now_unix: i64, threshold_days: i64) -> bool {
        self.not_after_unix - now_unix <= threshold_days * 86_400
    }
}

/// Reads `cert.pem`'s first certificate and returns its validity window.
pub fn read_validity(cert_path: &Path) -> anyhow::Result<CertValidity> {
    let pem = std::fs::read(cert_path)?;
    let der = rustls_pemfile::certs(&mut pem.as_slice())
        .next()
        .ok_or_else(|| anyhow::anyhow!("no certificate found in {}", cert_path.display()))??;
    let (_, parsed) = X509Certificate::from_der(&der)?;
    Ok(CertValidity {
        not_before_unix: parsed.validity().not_before.timestamp(),
        not_after_unix: parsed.validity().not_after.timestamp(),
    })
}

fn load_certified_key(domain_dir: &Path) -> anyhow::Result<CertifiedKey> {
    let cert_path = domain_dir.join("cert.pem");
    let key_path = domain_dir.join("key.pem");

    let cert_pem = std::fs::read(&cert_path)?;
    let chain: Vec<_> = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<_, _>>()?;

    let key_pem = std::fs::read(&key_path)?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)?;
    Ok(CertifiedKey::new(chain, signing_key))
}

/// Resolves a server certificate by exact SNI hostname match against
/// `${certificatesDir}/${domain}/` entries. No wildcard or default-cert
/// fallback is attempted (§4.10): an unknown SNI name fails the handshake.
pub struct CertificateStore {
    certificates_dir: PathBuf,
    by_domain: RwLock<HashMap<String, Arc<CertifiedKey>>>,
}

impl CertificateStore {
    pub fn new(certificates_dir: PathBuf) -> Self {
        Self {
            certificates_dir,
            by_domain: RwLock::new(HashMap::new()),
        }
    }

    /// Loads (or reloads) the certificate for `domain` from disk into the
    /// resolver's cache. Called at startup for every routed domain with
    /// `ssl: true`, and again after the Reload Coordinator observes a
    /// certificate directory change (§4.2, §4.10).
    pub fn load_domain(&self, domain: &str) -> anyhow::Result<()> {
        let dir = self.certificates_dir.join(domain);
        let key = load_certified_key(&dir)?;
        self.by_domain
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(domain.to_string(), Arc::new(key));
        Ok(())
    }

    /// Validity window for a loaded domain's certificate, used by the
    /// renewal-threshold check (§4.10).
    pub fn validity_of(&self, domain: &str) -> anyhow::Result<CertValidity> {
        read_validity(&self.certificates_dir.join(domain).join("cert.pem"))
    }

    pub fn known_domains(&self) -> Vec<String> {
        self.by_domain
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("certificates_dir", &self.certificates_dir)
            .finish()
    }
}

impl ResolvesServerCert for CertificateStore {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let name = client_hello.server_name()?;
        self.by_domain
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_threshold_is_inclusive_of_boundary() {
        let validity = CertValidity {
            not_before_unix: 0,
            not_after_unix: 30 * 86_400,
        };
        assert!(validity.needs_renewal(0, 30));
        assert!(!validity.needs_renewal(0, 29));
    }

    #[test]
    fn unknown_sni_name_resolves_to_none() {
        let store = CertificateStore::new(PathBuf::from("/nonexistent"));
        assert!(store.known_domains().is_empty());
    }
}
