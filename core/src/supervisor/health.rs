//! Health-check probing (§4.8): polls each managed process's configured
//! URL on its own interval, counts consecutive failures, and signals the
//! manager to kill-and-restart once a process crosses its
//! `failureThreshold`. Probes run with bounded concurrency so a slow batch
//! of upstreams can't starve the supervisor's other work.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::process_config::HealthCheckConfig;

/// Caps concurrent in-flight health probes across all managed processes.
const MAX_CONCURRENT_PROBES: usize = 8;

/// Outcome of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy,
    Unhealthy,
}

/// Resolves the URL a probe should hit: `config.path` used directly if it's
/// already an absolute URL, otherwise joined onto `target` (§4.8, §8
/// boundary behaviour). Returns `None` if `config.path` is relative and no
/// `target` is configured to resolve it against.
fn resolve_url(config: &HealthCheckConfig, target: Option<&str>) -> Option<String> {
    if config.path.starts_with("http://") || config.path.starts_with("https://") {
        return Some(config.path.clone());
    }
    let target = target?;
    Some(format!("{}{}", target.trim_end_matches('/'), config.path))
}

/// Probes `config.path` (or `target + config.path` when `path` is relative),
/// applying `config.timeoutSecs` and treating any status in
/// `config.expectedStatus` (or any 2xx if unset) as healthy.
pub async fn probe(client: &reqwest::Client, config: &HealthCheckConfig, target: Option<&str>) -> ProbeResult {
    let Some(url) = resolve_url(config, target) else {
        return ProbeResult::Unhealthy;
    };
    let timeout = Duration::from_secs(config.timeout_secs);
    match tokio::time::timeout(timeout, client.get(&url).send()).await {
        Ok(Ok(response)) => {
            let status = response.status().as_u16();
            let healthy = if config.expected_status.is_empty() {
                (200..300).contains(&status)
            } else {
                config.expected_status.contains(&status)
            };
            if healthy {
                ProbeResult::Healthy
            } else {
                ProbeResult::Unhealthy
            }
        }
        Ok(Err(_)) | Err(_) => ProbeResult::Unhealthy,
    }
}

/// Probes every `(id, config, target)` triple with bounded concurrency and
/// returns the results in arbitrary completion order.
pub async fn probe_all(
    client: reqwest::Client,
    checks: Vec<(String, HealthCheckConfig, Option<String>)>,
) -> Vec<(String, ProbeResult)> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PROBES));
    let mut handles = Vec::with_capacity(checks.len());

    for (id, config, target) in checks {
        let semaphore = semaphore.clone();
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let result = probe(&client, &config, target.as_deref()).await;
            (id, result)
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(pair) = handle.await {
            results.push(pair);
        }
    }
    results
}
