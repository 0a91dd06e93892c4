//! ACME HTTP-01 challenge route (§6): the certificate-authority collaborator
//! writes `${tempDir}/acme-challenges/<token>` with the expected key
//! authorization; this route only has to serve it back.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::app::AppState;

pub async fn serve_challenge(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let challenge_path = state.acme_challenge_dir.join(sanitize_token(&token));

    match tokio::fs::read_to_string(&challenge_path).await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Tokens are URL path segments already decoded by axum's router; strip any
/// path separators defensively before joining onto a filesystem directory.
fn sanitize_token(token: &str) -> String {
    token.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_').collect()
}
