//! Splices an upgraded client WebSocket connection through to the same
//! upstream the route would otherwise reverse-proxy HTTP traffic to (§4.4
//! DISPATCHED — "WebSocket upgrade requests are dispatched to the same
//! target, with the connection spliced rather than buffered").

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, warn};

/// Connects to `upstream_ws_url` and pumps frames bidirectionally between
/// `client_socket` and the upstream connection until either side closes or
/// errors. Errors on either leg end the splice; they're not retried here —
/// a dropped WebSocket is surfaced to the client as a close frame, not a
/// 502 (the upgrade already succeeded).
pub async fn splice(client_socket: WebSocket, upstream_ws_url: &str) {
    let (upstream, _response) = match tokio_tungstenite::connect_async(upstream_ws_url).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, url = upstream_ws_url, "failed to connect to upstream websocket");
            return;
        }
    };

    let (mut client_tx, mut client_rx) = client_socket.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = client_rx.next().await {
            let forwarded = match msg {
                AxumMessage::Text(t) => UpstreamMessage::Text(t.to_string().into()),
                AxumMessage::Binary(b) => UpstreamMessage::Binary(b.to_vec().into()),
                AxumMessage::Ping(p) => UpstreamMessage::Ping(p.to_vec().into()),
                AxumMessage::Pong(p) => UpstreamMessage::Pong(p.to_vec().into()),
                AxumMessage::Close(_) => break,
            };
            if upstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let forwarded = match msg {
                UpstreamMessage::Text(t) => AxumMessage::Text(t.to_string().into()),
                UpstreamMessage::Binary(b) => AxumMessage::Binary(b.to_vec().into()),
                UpstreamMessage::Ping(p) => AxumMessage::Ping(p.to_vec().into()),
                UpstreamMessage::Pong(p) => AxumMessage::Pong(p.to_vec().into()),
                UpstreamMessage::Close(_) | UpstreamMessage::Frame(_) => break,
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => debug!("client closed websocket splice"),
        _ = upstream_to_client => debug!("upstream closed websocket splice"),
    }
}
