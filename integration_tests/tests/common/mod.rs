use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use gateway_core::collaborators::{NullStatisticsSink, OAuth2Provider};
use gateway_core::config::{ConfigPathSet, ConfigStore};
use gateway_core::filters::NullGeoLookup;
use gateway_core::session::{InMemorySessionStore, SessionGate};
use gateway_core::{DispatchRequest, Dispatcher};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub struct NoopOAuth2;

#[async_trait]
impl OAuth2Provider for NoopOAuth2 {
    fn begin_authorization(&self, _route: &gateway_core::Route, _return_path: &str) -> String {
        "/auth/login".to_string()
    }

    async fn handle_callback(&self, _route: &gateway_core::Route, _query: &str) -> anyhow::Result<String> {
        Ok("test-user".to_string())
    }
}

pub fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

/// Builds a `ConfigStore` + `Dispatcher` pair from inline `proxy.yaml` and
/// `main.yaml` bodies, with the `Null*` collaborator stubs (§1 — ACME,
/// OAuth2, statistics, and cache integrations are named collaborator
/// contracts, not deeply implemented here).
pub fn build_dispatcher(dir: &tempfile::TempDir, proxy_yaml: &str, main_yaml: &str) -> (Arc<ConfigStore>, Dispatcher) {
    let main = write_file(dir, "main.yaml", main_yaml);
    let proxy = write_file(dir, "proxy.yaml", proxy_yaml);
    let store = Arc::new(
        ConfigStore::load(ConfigPathSet {
            main,
            proxy,
            processes: None,
        })
        .unwrap(),
    );

    let session_gate = Arc::new(SessionGate::new(64, 1_800_000, Box::new(InMemorySessionStore::default())));

    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(NullGeoLookup),
        Arc::new(NoopOAuth2),
        Arc::new(NullStatisticsSink),
        session_gate,
        1_800_000,
        reqwest::Client::new(),
    );

    (store, dispatcher)
}

pub fn get_request(host: &str, path: &str) -> DispatchRequest {
    DispatchRequest {
        method: Method::GET,
        host: host.to_string(),
        path: path.to_string(),
        query: None,
        headers: HeaderMap::new(),
        body: Bytes::new(),
        peer_ip: "203.0.113.7".parse().unwrap(),
        is_tls: true,
        websocket_upgrade: false,
    }
}

/// A bare-bones HTTP/1.1 server: reads the request line, discards headers
/// and any body, and replies with a fixed 200 whose text body is the
/// request path it actually received. Enough to observe what path/headers
/// the Upstream Proxy Engine forwarded, without pulling in a second web
/// framework as a test-only dependency.
pub async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let _ = handle_echo_connection(socket).await;
            });
        }
    });

    addr
}

async fn handle_echo_connection(socket: tokio::net::TcpStream) -> anyhow::Result<()> {
    let mut reader = BufReader::new(socket);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();

    let mut forwarded_for = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 || line == "\r\n" {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("x-forwarded-for:") {
            forwarded_for = value.trim().to_string();
        }
    }

    let body = format!("path={path} xff={forwarded_for}");
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\n\r\n{}",
        body.len(),
        body
    );
    let mut socket = reader.into_inner();
    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;

    // Drain any remaining body bytes the client may still send, best-effort.
    let mut buf = [0u8; 1024];
    let _ = tokio::time::timeout(std::time::Duration::from_millis(50), socket.read(&mut buf)).await;
    Ok(())
}
