//! Static Server (§4.4 DISPATCHED "static"): serves a file tree rooted at a
//! route's `staticPath`, with optional SPA fallback to `index.html` for any
//! path that has no matching file (§8 scenario 3).

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use std::path::{Path, PathBuf};

/// Resolves `request_path` under `root`, guarding against `..` path
/// traversal escaping the configured root, and falling back to
/// `index.html` when `spa_fallback` is set and no file matches.
pub async fn serve(
    root: &Path,
    request_path: &str,
    spa_fallback: bool,
) -> (StatusCode, Option<HeaderValue>, Body) {
    let Some(candidate) = resolve_safe_path(root, request_path) else {
        return (StatusCode::FORBIDDEN, None, Body::empty());
    };

    if let Some((bytes, content_type)) = read_file(&candidate).await {
        return (StatusCode::OK, content_type, Body::from(bytes));
    }

    if spa_fallback {
        if let Some((bytes, content_type)) = read_file(&root.join("index.html")).await {
            return (StatusCode::OK, content_type, Body::from(bytes));
        }
    }

    (StatusCode::NOT_FOUND, None, Body::empty())
}

/// Joins `request_path` onto `root` segment by segment, rejecting any `..`
/// component rather than relying on path normalization to catch escapes.
fn resolve_safe_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in request_path.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            seg => resolved.push(seg),
        }
    }
    Some(resolved)
}

async fn read_file(path: &Path) -> Option<(Vec<u8>, Option<HeaderValue>)> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let bytes = tokio::fs::read(path).await.ok()?;
    Some((bytes, guess_content_type(path)))
}

fn guess_content_type(path: &Path) -> Option<HeaderValue> {
    let ext = path.extension()?.to_str()?;
    let mime = match ext {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    };
    HeaderValue::from_str(mime).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("hello.txt"), b"hi").await.unwrap();
        let (status, _, _) = serve(dir.path(), "/hello.txt", false).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_file_without_fallback_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _, _) = serve(dir.path(), "/nope.txt", false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn spa_fallback_serves_index_html_for_deep_link() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index.html"), b"<html></html>")
            .await
            .unwrap();
        let (status, _, _) = serve(dir.path(), "/deep/link", true).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _, _) = serve(dir.path(), "/../../etc/passwd", false).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
