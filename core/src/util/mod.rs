//! # Shared Utilities
//!
//! Small helpers used across the config, routing, and supervisor modules:
//! `${VAR}` environment substitution (§3, §9) and OS-level PID liveness
//! checks used by process adoption and the supervisor's monitor (§4.8).

pub mod envsubst;
pub mod pid;
