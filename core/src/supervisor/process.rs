//! The managed-process state machine (§4.8): `New -> Running ->
//! {Exited, Killed, Detached}`, with restart accounting against a sliding
//! window and a terminal failed state once `maxRestarts` is exceeded.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::process_config::ProcessConfig;

/// Lifecycle state of one managed process instance (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Declared in config but not yet started.
    New,
    /// Actively running under supervision, with its current OS pid.
    Running { pid: u32 },
    /// Exited on its own; `code` is `None` if killed by a signal.
    Exited { code: Option<i32> },
    /// Killed by the supervisor itself (health-check failure or operator
    /// `forceKillAndRestart`), distinct from a process that exited on its own.
    Killed,
    /// Adopted at startup by PID-file reconnection, then observed to have
    /// exited or disappeared without the supervisor ever holding a child
    /// handle for it (so its exit status can't be recovered).
    Detached,
    /// Exceeded `maxRestarts` within `restartWindowSecs`; will not be
    /// restarted automatically again (§4.8).
    Failed,
}

/// Runtime bookkeeping for one entry in `processes.yaml` (§3, §4.8).
pub struct ManagedProcess {
    pub id: String,
    pub config: ProcessConfig,
    pub state: ProcessState,
    /// Timestamps of restarts within the current sliding window, oldest first.
    restart_times: VecDeque<Instant>,
    pub consecutive_health_failures: u32,
    /// Set when this instance was started by the Scheduler rather than at
    /// supervisor startup (§4.8); affects whether `autoStop` applies on exit.
    pub started_by_schedule: bool,
}

impl ManagedProcess {
    pub fn new(id: String, config: ProcessConfig) -> Self {
        Self {
            id,
            config,
            state: ProcessState::New,
            restart_times: VecDeque::new(),
            consecutive_health_failures: 0,
            started_by_schedule: false,
        }
    }

    /// Records a restart attempt now, evicting entries older than the
    /// configured window, and returns whether another restart is still
    /// allowed under `maxRestarts` (§4.8).
    pub fn record_restart_and_check_budget(&mut self) -> bool {
        let window = Duration::from_secs(self.config.restart_window_secs);
        let now = Instant::now();
        while let Some(&front) = self.restart_times.front() {
            if now.duration_since(front) > window {
                self.restart_times.pop_front();
            } else {
                break;
            }
        }
        self.restart_times.push_back(now);
        self.restart_times.len() as u32 <= self.config.max_restarts
    }

    pub fn should_restart_on_exit(&self, exit_code: Option<i32>) -> bool {
        use crate::config::process_config::RestartPolicy;
        match self.config.restart_policy {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => exit_code.map(|c| c != 0).unwrap_or(true),
            RestartPolicy::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::process_config::RestartPolicy;
    use std::path::PathBuf;

    fn proc(max_restarts: u32) -> ManagedProcess {
        ManagedProcess::new(
            "p".to_string(),
            ProcessConfig {
                command: "/bin/true".to_string(),
                args: vec![],
                cwd: None,
                target: None,
                env: Default::default(),
                restart_policy: RestartPolicy::Always,
                max_restarts,
                restart_window_secs: 60,
                pid_file: PathBuf::from("/tmp/p.pid"),
                log_file: None,
                health_check: None,
                schedule: None,
                run_at_startup: true,
            },
        )
    }

    #[test]
    fn budget_allows_up_to_max_restarts_within_window() {
        let mut p = proc(2);
        assert!(p.record_restart_and_check_budget());
        assert!(p.record_restart_and_check_budget());
        assert!(!p.record_restart_and_check_budget());
    }

    #[test]
    fn always_policy_restarts_on_clean_exit() {
        let p = proc(5);
        assert!(p.should_restart_on_exit(Some(0)));
    }

    #[test]
    fn on_failure_policy_skips_clean_exit() {
        let mut p = proc(5);
        p.config.restart_policy = RestartPolicy::OnFailure;
        assert!(!p.should_restart_on_exit(Some(0)));
        assert!(p.should_restart_on_exit(Some(1)));
    }
}
