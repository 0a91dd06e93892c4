mod common;

use std::sync::Arc;
use std::time::Duration;

use gateway_core::config::reload;
use tokio::sync::broadcast;

/// §4.2: a file-watcher-driven reload picks up a changed `proxy.yaml`
/// within the debounce window and publishes a new generation with the
/// updated routes, without dropping the previous snapshot on the floor.
#[tokio::test]
async fn file_change_triggers_debounced_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _dispatcher) = common::build_dispatcher(&dir, "port: 8080\nhttpsPort: 8443\nroutes: []\n", "");
    assert_eq!(store.current().generation, 1);
    assert_eq!(store.current().proxy.routes.len(), 0);

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let config_paths = vec![store.paths().proxy.clone()];
    let store_for_watcher = Arc::clone(&store);
    let watcher = tokio::spawn(reload::run(store_for_watcher, config_paths, Vec::new(), shutdown_rx));

    // Give the watcher a moment to start watching before we write.
    tokio::time::sleep(Duration::from_millis(100)).await;

    common::write_file(
        &dir,
        "proxy.yaml",
        "port: 8080\nhttpsPort: 8443\nroutes:\n  - domain: a.example.com\n    target: http://127.0.0.1:9000\n",
    );

    let mut reloaded = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if store.current().generation == 2 {
            reloaded = true;
            break;
        }
    }

    assert!(reloaded, "expected a reload within the polling window");
    assert_eq!(store.current().proxy.routes.len(), 1);

    let _ = shutdown_tx.send(());
    let _ = watcher.await;
}
