//! Reload Coordinator (§4.2): watches the three config files and the
//! certificate directory for changes, debounces bursts of filesystem events,
//! and drives an atomic [`ConfigStore::reload`].

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::store::ConfigStore;

/// Debounce window for `main.yaml`/`proxy.yaml`/the certificate directory: a
/// burst of filesystem events (editors often write a file via
/// rename-into-place, firing several events per save) collapses into a
/// single reload attempt fired this long after the last such event (§5).
pub const DEBOUNCE: Duration = Duration::from_millis(1000);

/// Debounce window specifically for `processes.yaml` changes (§5: "file
/// watcher debounce (1 s config, 2 s process config)"). Process config
/// changes drive supervisor reconciliation (spawns, kills, restarts), so a
/// longer window is given for an editor's save-burst to settle before the
/// coordinator acts on it.
pub const PROCESS_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Watches `config_paths` (main config, proxy config, certificate
/// directory) with the 1 s debounce and `process_paths` (the processes
/// file, if configured) with the 2 s debounce, and drives a debounced
/// [`ConfigStore::reload`] on either firing. Runs until `shutdown` fires.
pub async fn run(
    store: Arc<ConfigStore>,
    config_paths: Vec<PathBuf>,
    process_paths: Vec<PathBuf>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<Vec<PathBuf>>(64);

    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            // Best-effort: a full channel just means a reload is already
            // pending, which is exactly what we'd do anyway.
            let _ = tx.try_send(event.paths);
        }
    })?;

    for path in config_paths.iter().chain(process_paths.iter()) {
        if let Some(parent) = parent_or_self(path) {
            if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
                warn!(path = %parent.display(), error = %e, "failed to watch config path");
            }
        }
    }

    let mut config_deadline: Option<Instant> = None;
    let mut process_deadline: Option<Instant> = None;

    loop {
        let next_deadline = match (config_deadline, process_deadline) {
            (None, None) => None,
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (Some(a), Some(b)) => Some(a.min(b)),
        };

        tokio::select! {
            _ = shutdown.recv() => {
                info!("reload coordinator shutting down");
                return Ok(());
            }
            event = rx.recv() => {
                let Some(paths) = event else {
                    return Ok(());
                };
                let touches_process = process_paths.iter().any(|p| event_touches(&paths, p));
                let touches_config = config_paths.iter().any(|p| event_touches(&paths, p));
                let now = Instant::now();
                if touches_process {
                    process_deadline = Some(now + PROCESS_DEBOUNCE);
                }
                // An event matching neither watched set can still come from
                // the same watched parent directory (e.g. a sibling temp
                // file during rename-into-place); treat it conservatively
                // as config-relevant rather than silently dropping it.
                if touches_config || !touches_process {
                    config_deadline = Some(now + DEBOUNCE);
                }
            }
            _ = sleep_until_opt(next_deadline) => {
                let now = Instant::now();
                let mut should_reload = false;
                if let Some(d) = config_deadline {
                    if now >= d {
                        config_deadline = None;
                        should_reload = true;
                    }
                }
                if let Some(d) = process_deadline {
                    if now >= d {
                        process_deadline = None;
                        should_reload = true;
                    }
                }
                if should_reload {
                    match store.reload() {
                        Ok(snapshot) => {
                            info!(generation = snapshot.generation, "configuration reloaded");
                        }
                        Err(e) => {
                            error!(error = %e, "configuration reload failed, retaining previous snapshot");
                        }
                    }
                }
            }
        }
    }
}

/// True if `path` names one of the changed files directly, or is an
/// ancestor directory of one of them (for directory watches, e.g. the
/// certificate directory).
fn event_touches(event_paths: &[PathBuf], path: &Path) -> bool {
    event_paths.iter().any(|p| p == path || p.starts_with(path))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

fn parent_or_self(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
