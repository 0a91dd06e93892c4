//! # Process Supervisor (§4.8)
//!
//! Manages the lifecycle of the processes declared in `processes.yaml`:
//! spawning detached children, adopting already-running processes via their
//! PID file, restarting them per policy and budget, running their health
//! checks, and driving their cron schedules.

pub mod health;
pub mod manager;
pub mod pidfile;
pub mod process;
pub mod reconcile;
pub mod schedule;
pub mod spawn;

pub use manager::{run_monitor_loop, Supervisor};
pub use process::{ManagedProcess, ProcessState};
