//! Binds the HTTP, HTTPS, and management listeners (§4.10, §6). Each runs
//! as its own task and stops accepting once its shutdown signal fires;
//! draining in-flight requests within the §5 deadline is the caller's job.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tracing::info;

use gateway_core::tls::CertificateStore;

pub async fn serve_http(addr: SocketAddr, app: Router, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> anyhow::Result<()> {
    info!(%addr, "http listener bound");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_https(
    addr: SocketAddr,
    app: Router,
    cert_store: Arc<CertificateStore>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
    drain_deadline: std::time::Duration,
) -> anyhow::Result<()> {
    info!(%addr, "https listener bound");
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(cert_store);
    let rustls_config = RustlsConfig::from_config(Arc::new(server_config));

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown.recv().await;
        shutdown_handle.graceful_shutdown(Some(drain_deadline));
    });

    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

pub async fn serve_management(
    addr: SocketAddr,
    app: Router,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    info!(%addr, "management listener bound");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}
