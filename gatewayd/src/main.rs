//! `gatewayd`: binds the listeners and wires [`gateway_core`]'s dispatcher,
//! config store, and supervisor into a running process (§5, §6).

mod acme;
mod app;
mod cli;
mod listeners;
mod management;
mod oauth2;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use gateway_core::collaborators::{NullStatisticsSink, OAuth2Provider};
use gateway_core::config::{ConfigPathSet, ConfigStore};
use gateway_core::filters::NullGeoLookup;
use gateway_core::session::{InMemorySessionStore, SessionGate};
use gateway_core::supervisor::{run_monitor_loop, Supervisor};
use gateway_core::tls::CertificateStore;
use gateway_core::{config, Dispatcher};

/// Drain deadline listeners are given to finish in-flight requests once
/// shutdown begins (§5).
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

fn main() -> std::process::ExitCode {
    let cli = cli::Cli::parse();

    if let Some(path) = &cli.create_config {
        return match std::fs::write(path, cli::EXAMPLE_PROXY_YAML) {
            Ok(()) => {
                println!("wrote example config to {}", path.display());
                std::process::ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("failed to write {}: {e}", path.display());
                std::process::ExitCode::FAILURE
            }
        };
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    rt.block_on(async_main(cli))
}

async fn async_main(cli: cli::Cli) -> std::process::ExitCode {
    let main_path = cli::resolve_main_config_path(&cli);
    let main_dir = main_path.parent().unwrap_or_else(|| std::path::Path::new("."));

    // A first, un-overridden read of main.yaml just to resolve where
    // proxy.yaml/processes.yaml live before the real, validated load.
    let prelim_main: gateway_core::config::MainConfig =
        match std::fs::read_to_string(&main_path) {
            Ok(raw) => serde_yml::from_str(&raw).unwrap_or_default(),
            Err(_) => Default::default(),
        };

    let paths = ConfigPathSet {
        main: main_path.clone(),
        proxy: main_dir.join(&prelim_main.config.proxy),
        processes: prelim_main.config.processes.clone(),
    };

    let store = match ConfigStore::load(paths) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            // Logging isn't initialized yet; a config load failure is fatal
            // before we even know the configured log level (§6, §7).
            eprintln!("fatal: failed to load configuration: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let snapshot = store.current();
    let _logging_guard = gateway_core::logging::init(
        snapshot.proxy.logging.level.as_deref(),
        snapshot.proxy.logging.file.as_deref(),
        !snapshot.main.development.debug,
    );

    info!(generation = snapshot.generation, "configuration loaded");

    let session_gate = Arc::new(SessionGate::new(
        snapshot.proxy.security.session.cache_capacity,
        snapshot.main.management.session_timeout,
        Box::new(InMemorySessionStore::default()),
    ));

    let http_client = reqwest::Client::new();
    let oauth2_provider: Arc<dyn OAuth2Provider> =
        Arc::new(oauth2::HttpOAuth2Provider::new(http_client.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        Arc::new(NullGeoLookup),
        oauth2_provider,
        Arc::new(NullStatisticsSink),
        session_gate,
        snapshot.main.management.session_timeout,
        http_client,
    ));
    let cert_store = Arc::new(CertificateStore::new(snapshot.main.settings.certificates_dir.clone()));
    for route in &snapshot.proxy.routes {
        if route.ssl {
            if let Err(e) = cert_store.load_domain(&route.domain) {
                warn!(domain = %route.domain, error = %e, "failed to load certificate; HTTPS for this domain will fail the handshake");
            }
        }
    }

    let acme_challenge_dir = snapshot.main.settings.temp_dir.join("acme-challenges");
    let _ = std::fs::create_dir_all(&acme_challenge_dir);

    let supervisor = Arc::new(Supervisor::new());
    supervisor.start_all(snapshot.processes.clone()).await;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let monitor_handle = tokio::spawn(run_monitor_loop(supervisor.clone(), shutdown_tx.subscribe()));

    let reload_handle = if !cli::watch_disabled(&cli) {
        let config_paths = vec![
            store.paths().main.clone(),
            store.paths().proxy.clone(),
            snapshot.main.settings.certificates_dir.clone(),
        ];
        let process_paths = store.paths().processes.clone().into_iter().collect();
        Some(tokio::spawn(config::reload::run(
            store.clone(),
            config_paths,
            process_paths,
            shutdown_tx.subscribe(),
        )))
    } else {
        info!("config file watcher disabled");
        None
    };

    let http_addr = SocketAddr::from(([0, 0, 0, 0], snapshot.proxy.port));
    let https_addr = SocketAddr::from(([0, 0, 0, 0], snapshot.proxy.https_port));
    let mgmt_addr = SocketAddr::new(
        snapshot
            .main
            .management
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
        snapshot.main.management.port,
    );

    let http_app = app::router(app::AppState {
        dispatcher: dispatcher.clone(),
        is_tls: false,
        acme_challenge_dir: acme_challenge_dir.clone(),
    });
    let https_app = app::router(app::AppState {
        dispatcher: dispatcher.clone(),
        is_tls: true,
        acme_challenge_dir,
    });
    let mgmt_app = management::router(management::ManagementState {
        store: store.clone(),
        supervisor: supervisor.clone(),
        admin_password: snapshot.main.management.admin_password.clone(),
    });

    let http_handle = tokio::spawn(listeners::serve_http(http_addr, http_app, shutdown_tx.subscribe()));
    let https_handle = tokio::spawn(listeners::serve_https(
        https_addr,
        https_app,
        cert_store,
        shutdown_tx.subscribe(),
        SHUTDOWN_DRAIN,
    ));
    let mgmt_handle = tokio::spawn(listeners::serve_management(mgmt_addr, mgmt_app, shutdown_tx.subscribe()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining listeners");
    let _ = shutdown_tx.send(());

    let drain = tokio::time::timeout(
        SHUTDOWN_DRAIN,
        futures_util::future::join3(http_handle, https_handle, mgmt_handle),
    )
    .await;

    if drain.is_err() {
        warn!("listeners did not drain within the shutdown deadline");
    }
    let _ = tokio::join!(async { monitor_handle.await }, async {
        if let Some(h) = reload_handle {
            let _ = h.await;
        }
    });

    std::process::ExitCode::SUCCESS
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
