//! # Session Gate
//!
//! Opaque session-id issuance, an LRU cache in front of a pluggable
//! persistent store, and the expiry/slide-forward semantics required by
//! §4.9: a session is deleted from the store the moment it's found expired
//! on read, and a successful auth check slides its expiry forward.

use lru::LruCache;
use rand::RngCore;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A session record (§4.9).
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub domain: String,
    pub subject: String,
    /// Unix millis at which this session stops being valid.
    pub expires_at_ms: u64,
}

impl Session {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Persistence contract for sessions (§1 — the durable store itself is an
/// external collaborator; the gateway only needs this narrow interface).
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Session>;
    fn put(&self, session: Session);
    fn remove(&self, id: &str);
}

/// A process-local `SessionStore` backed by nothing but memory. Suitable
/// for single-instance deployments or tests; a production deployment is
/// expected to supply a durable implementation of the same trait.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<std::collections::HashMap<String, Session>>,
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    fn put(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.id.clone(), session);
    }

    fn remove(&self, id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

/// Session ids must carry at least 256 bits of entropy (§4.9 invariant).
const MIN_SESSION_ID_BYTES: usize = 32;

/// Generates a new opaque, hex-encoded session id with at least
/// `MIN_SESSION_ID_BYTES` of entropy, clamping any smaller configured value.
pub fn new_session_id(configured_bytes: usize) -> String {
    let bytes = configured_bytes.max(MIN_SESSION_ID_BYTES);
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// LRU cache in front of a [`SessionStore`] (§4.9). Reads that miss the
/// cache fall through to the store and populate the cache; an expired
/// session found on read is deleted from both before returning `None`.
pub struct SessionGate {
    cache: Mutex<LruCache<String, Session>>,
    store: Box<dyn SessionStore>,
    session_timeout_ms: u64,
}

impl SessionGate {
    pub fn new(capacity: usize, session_timeout_ms: u64, store: Box<dyn SessionStore>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            store,
            session_timeout_ms,
        }
    }

    /// Looks up `id` scoped to `domain` (§4.9 — sessions are domain scoped;
    /// a session minted for one domain is not honored on another). On a
    /// valid hit, slides the expiry forward by the configured timeout.
    pub fn check(&self, id: &str, domain: &str) -> Option<Session> {
        let now = now_ms();

        let cached = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.get(id).cloned()
        };

        let session = cached.or_else(|| self.store.get(id))?;

        if session.domain != domain {
            return None;
        }

        if session.is_expired(now) {
            self.store.remove(id);
            self.cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop(id);
            return None;
        }

        let refreshed = Session {
            expires_at_ms: now + self.session_timeout_ms,
            ..session
        };
        self.store.put(refreshed.clone());
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(id.to_string(), refreshed.clone());

        Some(refreshed)
    }

    /// Mints and stores a new session for `domain`/`subject` (§4.9).
    pub fn create(&self, domain: &str, subject: &str, id_bytes: usize) -> Session {
        let session = Session {
            id: new_session_id(id_bytes),
            domain: domain.to_string(),
            subject: subject.to_string(),
            expires_at_ms: now_ms() + self.session_timeout_ms,
        };
        self.store.put(session.clone());
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(session.id.clone(), session.clone());
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_at_least_256_bits_of_entropy() {
        let id = new_session_id(8);
        assert_eq!(id.len(), MIN_SESSION_ID_BYTES * 2);
    }

    #[test]
    fn expired_session_is_deleted_on_read() {
        let store = InMemorySessionStore::default();
        store.put(Session {
            id: "s1".into(),
            domain: "a.example.com".into(),
            subject: "user".into(),
            expires_at_ms: 1,
        });
        let gate = SessionGate::new(10, 60_000, Box::new(store));
        assert!(gate.check("s1", "a.example.com").is_none());
    }

    #[test]
    fn session_scoped_to_wrong_domain_is_rejected() {
        let store = InMemorySessionStore::default();
        let gate = SessionGate::new(10, 60_000, Box::new(store));
        let session = gate.create("a.example.com", "user", 32);
        assert!(gate.check(&session.id, "b.example.com").is_none());
        assert!(gate.check(&session.id, "a.example.com").is_some());
    }

    #[test]
    fn successful_check_slides_expiry_forward() {
        let store = InMemorySessionStore::default();
        let gate = SessionGate::new(10, 1000, Box::new(store));
        let session = gate.create("a.example.com", "user", 32);
        let refreshed = gate.check(&session.id, "a.example.com").unwrap();
        assert!(refreshed.expires_at_ms >= session.expires_at_ms);
    }
}
