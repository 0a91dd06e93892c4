//! Reconciles the supervisor's live process set against a freshly reloaded
//! `processes.yaml` (§4.2, §4.8): processes added to config are started,
//! processes removed from config are detached (never killed — the
//! "do not kill" invariant applies to config removal exactly as it does to
//! operator `stop`), and processes whose *essential* definition (command,
//! args, cwd, env) changed are stopped and respawned fresh. A change that
//! only touches restart/schedule/health-check parameters is applied to the
//! stored definition in place, with no interruption to the running child.

use std::collections::HashMap;

use crate::config::process_config::ProcessConfig;

/// One reconciliation action for a single process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// New in the reloaded config; not currently running.
    Start,
    /// Present in both, identical in every field; no action.
    Unchanged,
    /// Present in both with the same command/args/cwd/env but different
    /// restart/schedule/health-check parameters; update in place.
    UpdateInPlace,
    /// Present in both with a different command/args/cwd/env; stop then
    /// start fresh (§9 Open Question (a): resolved as force-stop-and-respawn,
    /// since the source left this ambiguous and this is the only policy
    /// consistent with "changes to command/args/cwd/env require
    /// stop-and-respawn" in §4.8).
    Restart,
    /// No longer present in the reloaded config; detach without killing —
    /// the operator is expected to stop it explicitly (§4.8).
    Remove,
}

/// Diffs `previous` against `next`, returning the action required for every
/// id that appears in either map.
pub fn diff(
    previous: &HashMap<String, ProcessConfig>,
    next: &HashMap<String, ProcessConfig>,
) -> HashMap<String, ReconcileAction> {
    let mut actions = HashMap::new();

    for (id, new_config) in next {
        match previous.get(id) {
            None => {
                actions.insert(id.clone(), ReconcileAction::Start);
            }
            Some(old_config) => {
                let action = if !essential_fields_equal(old_config, new_config) {
                    ReconcileAction::Restart
                } else if configs_equivalent(old_config, new_config) {
                    ReconcileAction::Unchanged
                } else {
                    ReconcileAction::UpdateInPlace
                };
                actions.insert(id.clone(), action);
            }
        }
    }

    for id in previous.keys() {
        if !next.contains_key(id) {
            actions.insert(id.clone(), ReconcileAction::Remove);
        }
    }

    actions
}

/// The fields whose change forces a stop-and-respawn (§4.8: "changes to
/// command / args / cwd / env require stop-and-respawn").
fn essential_fields_equal(a: &ProcessConfig, b: &ProcessConfig) -> bool {
    a.command == b.command && a.args == b.args && a.cwd == b.cwd && a.env == b.env
}

/// Full structural equivalence, including restart/schedule/health-check
/// parameters that can be applied in place (§4.8). `ProcessConfig` doesn't
/// derive `PartialEq` (its nested enums carry no need for it outside this
/// comparison), so the relevant fields are compared directly.
fn configs_equivalent(a: &ProcessConfig, b: &ProcessConfig) -> bool {
    essential_fields_equal(a, b)
        && a.restart_policy as u8 == b.restart_policy as u8
        && a.max_restarts == b.max_restarts
        && a.restart_window_secs == b.restart_window_secs
        && a.pid_file == b.pid_file
        && a.log_file == b.log_file
        && a.run_at_startup == b.run_at_startup
        && a.target == b.target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::process_config::RestartPolicy;
    use std::path::PathBuf;

    fn config(command: &str) -> ProcessConfig {
        ProcessConfig {
            command: command.to_string(),
            args: vec![],
            cwd: None,
            target: None,
            env: Default::default(),
            restart_policy: RestartPolicy::OnFailure,
            max_restarts: 5,
            restart_window_secs: 60,
            pid_file: PathBuf::from("/tmp/x.pid"),
            log_file: None,
            health_check: None,
            schedule: None,
            run_at_startup: true,
        }
    }

    #[test]
    fn new_process_id_is_started() {
        let previous = HashMap::new();
        let next = HashMap::from([("a".to_string(), config("/bin/true"))]);
        let actions = diff(&previous, &next);
        assert_eq!(actions.get("a"), Some(&ReconcileAction::Start));
    }

    #[test]
    fn removed_process_id_is_detached_not_killed() {
        let previous = HashMap::from([("a".to_string(), config("/bin/true"))]);
        let next = HashMap::new();
        let actions = diff(&previous, &next);
        assert_eq!(actions.get("a"), Some(&ReconcileAction::Remove));
    }

    #[test]
    fn changed_command_triggers_restart() {
        let previous = HashMap::from([("a".to_string(), config("/bin/true"))]);
        let next = HashMap::from([("a".to_string(), config("/bin/false"))]);
        let actions = diff(&previous, &next);
        assert_eq!(actions.get("a"), Some(&ReconcileAction::Restart));
    }

    #[test]
    fn identical_config_is_unchanged() {
        let previous = HashMap::from([("a".to_string(), config("/bin/true"))]);
        let next = HashMap::from([("a".to_string(), config("/bin/true"))]);
        let actions = diff(&previous, &next);
        assert_eq!(actions.get("a"), Some(&ReconcileAction::Unchanged));
    }

    #[test]
    fn restart_policy_only_change_updates_in_place() {
        let previous = HashMap::from([("a".to_string(), config("/bin/true"))]);
        let mut changed = config("/bin/true");
        changed.max_restarts = 10;
        let next = HashMap::from([("a".to_string(), changed)]);
        let actions = diff(&previous, &next);
        assert_eq!(actions.get("a"), Some(&ReconcileAction::UpdateInPlace));
    }
}
