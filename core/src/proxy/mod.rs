//! # Upstream Proxy Engine & Dynamic Forward Proxy
//!
//! `upstream` reverse-proxies a request to a route's fixed `target` (§4.4
//! DISPATCHED, §4.5 of the glossary's "Upstream"); `forward` implements the
//! caller-directed Dynamic Forward Proxy (§4.6); `websocket` splices an
//! upgraded connection through to the same upstream.

pub mod forward;
pub mod static_server;
pub mod upstream;
pub mod websocket;

/// Headers that must never be copied between the client and upstream legs
/// of a proxied connection — they describe the connection itself, not the
/// resource, and each hop sets its own (RFC 7230 §6.1; §4.4 REWRITTEN).
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}
