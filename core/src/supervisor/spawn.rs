//! Spawns a managed process detached from the supervisor's own process
//! group (§4.8 "detached child" — the supervisor's own shutdown must never
//! signal its children), with stdout/stderr redirected to a log file with
//! timestamped lines.

use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::warn;

use crate::config::process_config::ProcessConfig;
use crate::errors::SupervisorError;
use crate::util::envsubst;

/// Builds the child's environment: the supervisor's own environment,
/// overlaid with the process's configured `env` map after `${VAR}`
/// substitution, with `PROCESS_ID` and `TIMESTAMP` reserved and always
/// taking priority (§3).
fn build_env(id: &str, config: &ProcessConfig) -> HashMap<String, String> {
    let parent_env: HashMap<String, String> = std::env::vars().collect();
    let mut reserved = HashMap::new();
    reserved.insert("PROCESS_ID".to_string(), id.to_string());
    reserved.insert(
        "TIMESTAMP".to_string(),
        chrono::Utc::now().to_rfc3339(),
    );

    let mut env = parent_env.clone();
    for (k, v) in &config.env {
        let substituted = envsubst::substitute_with_reserved(v, &parent_env, &reserved);
        env.insert(k.clone(), substituted);
    }
    env.insert("PROCESS_ID".to_string(), id.to_string());
    env
}

/// Spawns `config` as a detached child: its own session (`setsid`), so it
/// survives the supervisor's own process group receiving a signal, and
/// redirected stdout/stderr piped back for timestamped logging rather than
/// inherited (§4.8).
pub fn spawn_detached(id: &str, config: &ProcessConfig) -> Result<Child, SupervisorError> {
    let env = build_env(id, config);

    let mut command = Command::new(&config.command);
    command
        .args(&config.args)
        .envs(&env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(cwd) = &config.cwd {
        command.current_dir(cwd);
    }

    // SAFETY: setsid(2) detaches the child into its own session so that
    // signals delivered to the supervisor's process group (e.g. Ctrl-C in
    // a foreground shell) are not also delivered to the child (§4.8).
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map(|_| ()).map_err(|e| {
                std::io::Error::from_raw_os_error(e as i32)
            })
        });
    }

    command.spawn().map_err(|source| SupervisorError::SpawnFailed {
        id: id.to_string(),
        source,
    })
}

/// Spawns background tasks that read the child's stdout/stderr line by line
/// and append timestamped entries to `log_file`, if configured (§4.8).
pub fn wire_logging(child: &mut Child, log_file: Option<std::path::PathBuf>) {
    let Some(log_path) = log_file else { return };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    if let Some(stdout) = child.stdout.take() {
        let path = log_path.clone();
        tokio::spawn(pump_to_log(stdout, path, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        let path = log_path.clone();
        tokio::spawn(pump_to_log(stderr, path, "stderr"));
    }
}

async fn pump_to_log<R: tokio::io::AsyncRead + Unpin>(
    reader: R,
    log_path: std::path::PathBuf,
    stream_name: &'static str,
) {
    use tokio::io::AsyncWriteExt;

    let mut lines = BufReader::new(reader).lines();
    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %log_path.display(), error = %e, "failed to open process log file");
            return;
        }
    };

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let stamped = format!(
                    "[{}] [{stream_name}] {line}\n",
                    chrono::Utc::now().to_rfc3339()
                );
                if file.write_all(stamped.as_bytes()).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::process_config::RestartPolicy;
    use std::path::PathBuf;

    fn config() -> ProcessConfig {
        ProcessConfig {
            command: "/bin/echo".to_string(),
            args: vec!["hello".to_string()],
            cwd: None,
            target: None,
            env: HashMap::from([("GREETING".to_string(), "hi ${PROCESS_ID}".to_string())]),
            restart_policy: RestartPolicy::Never,
            max_restarts: 0,
            restart_window_secs: 60,
            pid_file: PathBuf::from("/tmp/echo.pid"),
            log_file: None,
            health_check: None,
            schedule: None,
            run_at_startup: true,
        }
    }

    #[test]
    fn build_env_substitutes_reserved_process_id() {
        let env = build_env("worker-1", &config());
        assert_eq!(env.get("GREETING").unwrap(), "hi worker-1");
        assert_eq!(env.get("PROCESS_ID").unwrap(), "worker-1");
    }
}
