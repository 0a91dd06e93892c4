//! `processes.yaml` — the Process Supervisor's declarative process table (§3, §6).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_window_secs() -> u64 {
    60
}

fn default_health_interval_secs() -> u64 {
    10
}

fn default_health_timeout_secs() -> u64 {
    5
}

fn default_health_failure_threshold() -> u32 {
    3
}

/// Restart policy for a managed process (§3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Restart on any exit, success or failure.
    Always,
    /// Restart only on non-zero exit / signal death.
    OnFailure,
    /// Never restart automatically.
    Never,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::OnFailure
    }
}

/// HTTP health-check probe configuration (§4.8, §8 boundary behaviour:
/// "Health check path beginning with `http://` or `https://` bypasses
/// `target` concatenation").
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    /// Either an absolute URL (polled as-is) or a path relative to the
    /// owning [`ProcessConfig::target`], joined with it at probe time.
    pub path: String,
    /// Poll interval in seconds.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    /// Per-probe request timeout in seconds.
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
    /// Consecutive failures before the process is killed and respawned (§4.8).
    #[serde(default = "default_health_failure_threshold")]
    pub failure_threshold: u32,
    /// Status codes considered healthy; empty means "any 2xx" (§4.8).
    #[serde(default)]
    pub expected_status: Vec<u16>,
}

/// Cron-style schedule for a managed process (§4.8, GLOSSARY "Schedule").
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// Standard 5 or 6-field cron expression, evaluated in `timezone`.
    pub cron: String,
    /// IANA timezone name; defaults to UTC.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// If the previous scheduled run is still active, skip this firing
    /// instead of starting a second concurrent instance.
    #[serde(default = "default_true")]
    pub skip_if_running: bool,
    /// Maximum run duration in seconds before the instance is killed.
    pub max_duration_secs: Option<u64>,
    /// Stop (not restart) the process once it exits, ignoring `restartPolicy`
    /// for this run — used for one-shot scheduled jobs.
    #[serde(default)]
    pub auto_stop: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A single managed process entry (§3).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Executable path or name resolved via `PATH`.
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; defaults to the gateway's own cwd.
    pub cwd: Option<PathBuf>,
    /// Base URL of the service this process exposes (e.g.
    /// `http://127.0.0.1:9100`), used to resolve a relative
    /// `healthCheck.path` (§4.8, §8).
    pub target: Option<String>,
    /// Extra environment variables, subject to `${VAR}` substitution and the
    /// reserved `PROCESS_ID`/`TIMESTAMP` overlay (§3).
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Restart policy (§4.8).
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Restart attempts allowed within `restartWindowSecs` before the process
    /// is parked in a terminal failed state (§4.8).
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Sliding window, in seconds, over which `maxRestarts` is counted.
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
    /// PID file path; used both to record this instance's pid and, on
    /// supervisor startup, to attempt adoption of an already-running
    /// process (§4.8).
    pub pid_file: PathBuf,
    /// Log file path; stdout/stderr are redirected here with timestamped
    /// lines (§4.8).
    pub log_file: Option<PathBuf>,
    /// Optional health check.
    pub health_check: Option<HealthCheckConfig>,
    /// Optional cron schedule. Mutually informative with `restartPolicy`:
    /// a scheduled process is started by the scheduler, not at supervisor
    /// startup, unless `runAtStartup` is also set.
    pub schedule: Option<ScheduleConfig>,
    /// Start this process immediately when the supervisor starts, even if
    /// it also carries a `schedule`.
    #[serde(default)]
    pub run_at_startup: bool,
}

/// Top-level `processes.yaml` document (§6).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProcessesFile {
    /// Process id -> process definition.
    #[serde(default)]
    pub processes: HashMap<String, ProcessConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_defaults_to_on_failure() {
        let yaml = "command: /bin/true\npidFile: /tmp/x.pid\n";
        let p: ProcessConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(p.restart_policy, RestartPolicy::OnFailure);
        assert_eq!(p.max_restarts, 5);
    }

    #[test]
    fn parses_full_processes_file() {
        let yaml = r#"
processes:
  worker:
    command: /usr/bin/worker
    args: ["--port", "9100"]
    pidFile: /var/run/worker.pid
    restartPolicy: always
    target: http://127.0.0.1:9100
    healthCheck:
      path: /health
      intervalSecs: 5
    schedule:
      cron: "0 */6 * * *"
      skipIfRunning: true
"#;
        let f: ProcessesFile = serde_yml::from_str(yaml).unwrap();
        let worker = f.processes.get("worker").unwrap();
        assert_eq!(worker.restart_policy, RestartPolicy::Always);
        assert!(worker.health_check.is_some());
        assert!(worker.schedule.as_ref().unwrap().skip_if_running);
    }
}
