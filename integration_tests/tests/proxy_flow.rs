mod common;

use gateway_core::DispatchOutcome;

/// Scenario 1 (§8): a plain proxy route forwards to the upstream and the
/// response carries the injected `X-Forwarded-For`.
#[tokio::test]
async fn proxy_happy_path_forwards_client_ip() {
    let upstream_addr = common::spawn_echo_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let (_store, dispatcher) = common::build_dispatcher(
        &dir,
        &format!(
            "port: 8080\nhttpsPort: 8443\nroutes:\n  - domain: api.example.com\n    type: proxy\n    target: http://{upstream_addr}\n"
        ),
        "",
    );

    let outcome = dispatcher.dispatch(common::get_request("api.example.com", "/v1/ping")).await;
    let DispatchOutcome::Response(resp) = outcome else {
        panic!("expected a response, got a websocket upgrade");
    };
    assert_eq!(resp.status, axum::http::StatusCode::OK);

    let body = axum::body::to_bytes(resp.body, usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("path=/v1/ping"), "body was {body}");
    assert!(body.contains("xff=203.0.113.7"), "body was {body}");
}

/// Scenario 2 (§8): declaration-order rewrite rules transform the path
/// before it reaches the upstream.
#[tokio::test]
async fn rewrite_rules_apply_before_dispatch() {
    let upstream_addr = common::spawn_echo_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let (_store, dispatcher) = common::build_dispatcher(
        &dir,
        &format!(
            "port: 8080\nhttpsPort: 8443\nroutes:\n  - domain: api.example.com\n    type: proxy\n    target: http://{upstream_addr}\n    rewrite:\n      \"^/api/\": \"/v1/\"\n"
        ),
        "",
    );

    let outcome = dispatcher.dispatch(common::get_request("api.example.com", "/api/users")).await;
    let DispatchOutcome::Response(resp) = outcome else {
        panic!("expected a response");
    };
    let body = axum::body::to_bytes(resp.body, usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("path=/v1/users"), "body was {body}");
}

/// Scenario 3 (§8): a static route with `spaFallback` serves `index.html`
/// for any path with no matching file on disk.
#[tokio::test]
async fn spa_fallback_serves_index_html() {
    let dir = tempfile::tempdir().unwrap();
    let static_root = dir.path().join("dist");
    std::fs::create_dir_all(&static_root).unwrap();
    std::fs::write(static_root.join("index.html"), "<html>shell</html>").unwrap();

    let (_store, dispatcher) = common::build_dispatcher(
        &dir,
        &format!(
            "port: 8080\nhttpsPort: 8443\nroutes:\n  - domain: app.example.com\n    type: static\n    staticPath: \"{}\"\n    spaFallback: true\n",
            static_root.display()
        ),
        "",
    );

    let outcome = dispatcher.dispatch(common::get_request("app.example.com", "/deep/link")).await;
    let DispatchOutcome::Response(resp) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(resp.status, axum::http::StatusCode::OK);
    let body = axum::body::to_bytes(resp.body, usize::MAX).await.unwrap();
    assert_eq!(body.to_vec(), b"<html>shell</html>".to_vec());
}

/// Scenario 4 (§8): a third request within the window succeeds, a fourth
/// is rejected with 429.
#[tokio::test]
async fn fourth_request_within_window_is_rate_limited() {
    let upstream_addr = common::spawn_echo_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let (_store, dispatcher) = common::build_dispatcher(
        &dir,
        &format!(
            "port: 8080\nhttpsPort: 8443\nroutes:\n  - domain: api.example.com\n    type: proxy\n    target: http://{upstream_addr}\nsecurity:\n  rateLimit:\n    windowMs: 60000\n    maxRequests: 3\n"
        ),
        "",
    );

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let outcome = dispatcher.dispatch(common::get_request("api.example.com", "/v1/ping")).await;
        let DispatchOutcome::Response(resp) = outcome else {
            panic!("expected a response");
        };
        statuses.push(resp.status);
    }

    assert_eq!(
        statuses,
        vec![
            axum::http::StatusCode::OK,
            axum::http::StatusCode::OK,
            axum::http::StatusCode::OK,
            axum::http::StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}
