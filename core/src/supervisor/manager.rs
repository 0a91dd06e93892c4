//! # Process Supervisor
//!
//! Owns every [`ManagedProcess`], drives the ~1s monitor tick, the health
//! checker, and the cron [`Scheduler`], and exposes the operator-facing
//! `stop`/`force_kill_and_restart` operations (§4.8).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::process_config::ProcessConfig;
use crate::errors::SupervisorError;
use crate::util::pid;

use super::health::{self, ProbeResult};
use super::pidfile;
use super::process::{ManagedProcess, ProcessState};
use super::reconcile::{self, ReconcileAction};
use super::schedule::Scheduler;
use super::spawn;

/// How often the monitor tick re-checks every managed process's liveness
/// and advances the scheduler (§4.8 "~1s monitor probe").
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

struct Instance {
    managed: ManagedProcess,
    child: Option<tokio::process::Child>,
}

/// Owns and drives every managed process for the lifetime of the gateway.
///
/// Both maps use a plain [`std::sync::Mutex`], not an async one: every
/// critical section here is non-blocking CPU work (spawning a process is a
/// synchronous syscall, not an `.await`), so there is no point in time where
/// the lock is held across a suspend point, and no risk of one async method
/// deadlocking on a lock another is already holding.
pub struct Supervisor {
    instances: Mutex<HashMap<String, Instance>>,
    scheduler: Mutex<Scheduler>,
    health_client: reqwest::Client,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            scheduler: Mutex::new(Scheduler::new()),
            health_client: reqwest::Client::new(),
        }
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instance>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_scheduler(&self) -> std::sync::MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts from a freshly loaded `processes.yaml`: attempts PID-file
    /// adoption for every entry, then spawns whatever couldn't be adopted
    /// and is marked `runAtStartup` (§4.8).
    pub async fn start_all(&self, processes: HashMap<String, ProcessConfig>) {
        for (id, config) in processes {
            if let Some(sched) = &config.schedule {
                if let Err(e) = self.lock_scheduler().set_schedule(&id, sched) {
                    warn!(process = %id, error = %e, "invalid schedule, process will not run on a timer");
                }
            }

            let mut managed = ManagedProcess::new(id.clone(), config.clone());

            if let Some(adopted_pid) = pidfile::try_adopt(&config.pid_file) {
                info!(process = %id, pid = adopted_pid, "adopted running process via pid file");
                managed.state = ProcessState::Running { pid: adopted_pid };
                self.lock_instances().insert(id, Instance { managed, child: None });
                continue;
            }

            let child = config.run_at_startup.then(|| self.spawn_into(&mut managed)).flatten();
            self.lock_instances().insert(id, Instance { managed, child });
        }
    }

    /// Spawns `managed`'s configured command, updates its state, and returns
    /// the live child handle on success. Purely synchronous — safe to call
    /// while holding any of this struct's locks.
    fn spawn_into(&self, managed: &mut ManagedProcess) -> Option<tokio::process::Child> {
        match spawn::spawn_detached(&managed.id, &managed.config) {
            Ok(mut child) => {
                let pid = child.id().unwrap_or(0);
                if let Err(e) = pidfile::write_pid(&managed.config.pid_file, pid) {
                    warn!(process = %managed.id, error = %e, "failed to write pid file");
                }
                spawn::wire_logging(&mut child, managed.config.log_file.clone());
                managed.state = ProcessState::Running { pid };
                managed.consecutive_health_failures = 0;
                Some(child)
            }
            Err(e) => {
                warn!(process = %managed.id, error = %e, "failed to spawn process");
                managed.state = ProcessState::Exited { code: None };
                None
            }
        }
    }

    /// One monitor tick (§4.8): reaps exited children, restarts per policy,
    /// runs due health checks, and starts anything the scheduler says is due.
    pub async fn tick(&self, now: chrono::DateTime<chrono::Utc>) {
        self.reap_and_restart();
        self.run_health_checks().await;
        self.run_due_schedule(now);
    }

    fn reap_and_restart(&self) {
        let mut instances = self.lock_instances();
        let ids: Vec<String> = instances.keys().cloned().collect();

        for id in ids {
            let Some(instance) = instances.get_mut(&id) else {
                continue;
            };

            let exited_code = match instance.child.as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(Some(status)) => Some(status.code()),
                    _ => None,
                },
                None => {
                    // Adopted process with no child handle: liveness-check
                    // the pid directly instead (§4.8).
                    match instance.managed.state {
                        ProcessState::Running { pid } if !pid::is_alive(pid) => Some(None),
                        _ => None,
                    }
                }
            };

            let Some(code) = exited_code else { continue };

            instance.managed.state = ProcessState::Exited { code };
            instance.child = None;

            if instance.managed.should_restart_on_exit(code)
                && instance.managed.record_restart_and_check_budget()
            {
                info!(process = %id, code = ?code, "restarting process after exit");
                instance.child = self.spawn_into(&mut instance.managed);
            } else if !instance.managed.should_restart_on_exit(code) {
                info!(process = %id, code = ?code, "process exited, restart policy does not apply");
            } else {
                warn!(process = %id, "process exceeded max restarts within window, giving up");
                instance.managed.state = ProcessState::Failed;
            }
        }
    }

    async fn run_health_checks(&self) {
        let checks: Vec<(String, crate::config::process_config::HealthCheckConfig, Option<String>)> = self
            .lock_instances()
            .iter()
            .filter_map(|(id, instance)| {
                instance
                    .managed
                    .config
                    .health_check
                    .clone()
                    .map(|hc| (id.clone(), hc, instance.managed.config.target.clone()))
            })
            .collect();

        if checks.is_empty() {
            return;
        }

        let results = health::probe_all(self.health_client.clone(), checks).await;

        let mut instances = self.lock_instances();
        for (id, result) in results {
            let Some(instance) = instances.get_mut(&id) else {
                continue;
            };
            match result {
                ProbeResult::Healthy => instance.managed.consecutive_health_failures = 0,
                ProbeResult::Unhealthy => {
                    instance.managed.consecutive_health_failures += 1;
                    let threshold = instance
                        .managed
                        .config
                        .health_check
                        .as_ref()
                        .map(|h| h.failure_threshold)
                        .unwrap_or(u32::MAX);
                    if instance.managed.consecutive_health_failures >= threshold {
                        warn!(process = %id, "health check failure threshold reached, killing and restarting");
                        Self::kill_and_restart(instance, &self.health_client, |m| self.spawn_into(m));
                    }
                }
            }
        }
    }

    fn run_due_schedule(&self, now: chrono::DateTime<chrono::Utc>) {
        let due = self.lock_scheduler().due(now);
        if due.is_empty() {
            return;
        }

        let mut instances = self.lock_instances();
        for id in due {
            let Some(instance) = instances.get_mut(&id) else {
                continue;
            };
            let skip_if_running = instance
                .managed
                .config
                .schedule
                .as_ref()
                .map(|s| s.skip_if_running)
                .unwrap_or(true);

            let already_running = matches!(instance.managed.state, ProcessState::Running { .. });
            if already_running && skip_if_running {
                info!(process = %id, "schedule fired but instance is still running, skipping");
                continue;
            }

            instance.managed.started_by_schedule = true;
            instance.child = self.spawn_into(&mut instance.managed);
        }
    }

    /// Operator-initiated stop (§4.8): detaches from the child *without*
    /// killing it — only the supervisor's own log-tail resources are
    /// released. The process keeps running as an ordinary, now-unmanaged
    /// OS process; its PID file is left intact.
    pub fn stop(&self, id: &str) -> Result<(), SupervisorError> {
        let mut instances = self.lock_instances();
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| SupervisorError::UnknownProcess(id.to_string()))?;

        // Dropping the `Child` handle does not kill the process: tokio only
        // kills on drop if `kill_on_drop` was explicitly set, which
        // `spawn_detached` never does.
        instance.child = None;
        instance.managed.state = ProcessState::Detached;
        Ok(())
    }

    /// Operator escape hatch (§4.8): unconditionally kills and immediately
    /// respawns, bypassing the restart-budget check (but still counting
    /// against it, so repeated operator kicks still eventually land on
    /// `Failed` if the process can't actually come up healthy).
    pub fn force_kill_and_restart(&self, id: &str) -> Result<(), SupervisorError> {
        let mut instances = self.lock_instances();
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| SupervisorError::UnknownProcess(id.to_string()))?;
        Self::kill_and_restart(instance, &self.health_client, |m| self.spawn_into(m));
        Ok(())
    }

    fn kill_and_restart(
        instance: &mut Instance,
        _health_client: &reqwest::Client,
        spawn: impl FnOnce(&mut ManagedProcess) -> Option<tokio::process::Child>,
    ) {
        kill_running(instance);
        instance.managed.consecutive_health_failures = 0;
        instance.managed.record_restart_and_check_budget();
        instance.child = spawn(&mut instance.managed);
    }

    /// Snapshot of every managed process's current state, surfaced on the
    /// management console's status endpoint (§6 "supervisor errors surface
    /// to logs and to the management console via status endpoints").
    pub fn status(&self) -> HashMap<String, ProcessState> {
        self.lock_instances()
            .iter()
            .map(|(id, instance)| (id.clone(), instance.managed.state.clone()))
            .collect()
    }

    /// Reconciles against a freshly reloaded process table (§4.2, §4.8):
    /// new ids are started, removed ids are stopped, changed ids are
    /// restarted with their new definition, and unchanged ids are untouched.
    pub async fn reconcile(&self, next: HashMap<String, ProcessConfig>) {
        let previous: HashMap<String, ProcessConfig> = self
            .lock_instances()
            .iter()
            .map(|(id, instance)| (id.clone(), instance.managed.config.clone()))
            .collect();

        let actions = reconcile::diff(&previous, &next);

        let mut instances = self.lock_instances();
        let mut scheduler = self.lock_scheduler();

        for (id, action) in actions {
            match action {
                ReconcileAction::Unchanged => {}
                ReconcileAction::Remove => {
                    // Detach without killing: the child keeps running as an
                    // unmanaged process (§4.8). The operator is expected to
                    // stop it explicitly if that's what's wanted.
                    if let Some(mut instance) = instances.remove(&id) {
                        instance.child = None;
                    }
                    scheduler.remove(&id);
                }
                ReconcileAction::UpdateInPlace => {
                    let Some(config) = next.get(&id) else { continue };
                    if let Some(instance) = instances.get_mut(&id) {
                        instance.managed.config = config.clone();
                    }
                    if let Some(sched) = &config.schedule {
                        if let Err(e) = scheduler.set_schedule(&id, sched) {
                            warn!(process = %id, error = %e, "invalid schedule on reload");
                        }
                    } else {
                        scheduler.remove(&id);
                    }
                }
                ReconcileAction::Restart => {
                    // The outgoing instance is killed outright (§9 Open
                    // Question (a): command/args/cwd/env changes force a
                    // respawn rather than waiting for operator action), so
                    // there is nothing left to adopt; always spawn fresh.
                    if let Some(mut old) = instances.remove(&id) {
                        kill_running(&mut old);
                    }
                    let Some(config) = next.get(&id) else { continue };

                    if let Some(sched) = &config.schedule {
                        if let Err(e) = scheduler.set_schedule(&id, sched) {
                            warn!(process = %id, error = %e, "invalid schedule on reload");
                        }
                    } else {
                        scheduler.remove(&id);
                    }

                    let mut managed = ManagedProcess::new(id.clone(), config.clone());
                    let child = config
                        .run_at_startup
                        .then(|| self.spawn_into(&mut managed))
                        .flatten();
                    instances.insert(id, Instance { managed, child });
                }
                ReconcileAction::Start => {
                    let Some(config) = next.get(&id) else { continue };

                    if let Some(sched) = &config.schedule {
                        if let Err(e) = scheduler.set_schedule(&id, sched) {
                            warn!(process = %id, error = %e, "invalid schedule on reload");
                        }
                    } else {
                        scheduler.remove(&id);
                    }

                    let mut managed = ManagedProcess::new(id.clone(), config.clone());

                    // An added id may be reappearing after a prior Remove,
                    // or may name a process already started out-of-band; try
                    // adoption by pid file first, exactly as `start_all`
                    // does, before spawning (§4.8: "For added ids, spawn or
                    // adopt as at startup").
                    if let Some(adopted_pid) = pidfile::try_adopt(&config.pid_file) {
                        info!(process = %id, pid = adopted_pid, "adopted running process via pid file on reload");
                        managed.state = ProcessState::Running { pid: adopted_pid };
                        instances.insert(id, Instance { managed, child: None });
                        continue;
                    }

                    let child = config
                        .run_at_startup
                        .then(|| self.spawn_into(&mut managed))
                        .flatten();
                    instances.insert(id, Instance { managed, child });
                }
            }
        }
    }
}

fn kill_running(instance: &mut Instance) {
    if let ProcessState::Running { pid } = instance.managed.state {
        if let Some(child) = instance.child.as_mut() {
            let _ = child.start_kill();
        } else {
            let _ = pid::kill_forcibly(pid);
        }
    }
    instance.child = None;
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the monitor loop on [`MONITOR_INTERVAL`] until `shutdown` fires.
/// Per §4.8/§5: this loop ending never touches managed children — they are
/// detached and outlive the supervisor's own process unless explicitly
/// stopped by an operator.
pub async fn run_monitor_loop(
    supervisor: Arc<Supervisor>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(MONITOR_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                supervisor.tick(chrono::Utc::now()).await;
            }
            _ = shutdown.recv() => {
                info!("supervisor monitor loop shutting down, leaving managed processes running");
                return;
            }
        }
    }
}
