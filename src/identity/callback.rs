//!
//! Loopback callback relay
//! -----------------------
//! The identity provider redirects to `/callback` with the token in the URL
//! fragment, which never reaches a server. The page served there reads the
//! fragment and posts it back to `/message` as an `oidc-callback` message;
//! the `Origin` header of that request decides whether the handshake accepts it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::handshake::{LoginHandshake, MessageOutcome};
use crate::error::{AppError, AppResult};

const CALLBACK_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Sign-in</title></head>
<body>
<p id="status">Completing sign-in…</p>
<script>
  const params = new URLSearchParams(window.location.hash.substring(1));
  const data = { state: params.get('state') };
  if (params.get('access_token')) { data.token = params.get('access_token'); }
  if (params.get('error')) { data.error = params.get('error_description') || params.get('error'); }
  fetch('/message', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ type: 'oidc-callback', data: data })
  }).then(function (r) { return r.json(); })
    .then(function (r) {
      document.getElementById('status').textContent =
        r.status === 'resolved' ? 'Signed in. You can close this window.' : 'Sign-in failed. You can close this window.';
    });
</script>
</body>
</html>
"#;

/// Routes served on the loopback origin.
pub fn router(handshake: Arc<LoginHandshake>) -> Router {
    Router::new()
        .route("/callback", get(callback_page))
        .route("/message", post(message_handler))
        .with_state(handshake)
}

async fn callback_page() -> Html<&'static str> {
    Html(CALLBACK_PAGE)
}

async fn message_handler(State(handshake): State<Arc<LoginHandshake>>, headers: HeaderMap, Json(payload): Json<Value>) -> impl IntoResponse {
    let origin = headers.get("origin").and_then(|v| v.to_str().ok()).unwrap_or("");
    match handshake.handle_raw(origin, &payload) {
        MessageOutcome::Resolved => (StatusCode::OK, Json(json!({"status": "resolved"}))),
        MessageOutcome::Rejected(err) => {
            let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::FORBIDDEN);
            (status, Json(json!({"status": "rejected", "code": err.code_str(), "message": err.message()})))
        }
        MessageOutcome::Ignored => (StatusCode::ACCEPTED, Json(json!({"status": "ignored"}))),
    }
}

/// Bind the loopback listener and return it with the origin it serves.
/// Port 0 picks a free port.
pub async fn bind(port: u16) -> AppResult<(TcpListener, String)> {
    let addr: SocketAddr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::config(format!("cannot bind callback listener on {}: {}", addr, e)))?;
    let local = listener.local_addr()?;
    Ok((listener, format!("http://{}", local)))
}

/// A running relay; dropping it without `shutdown` leaves the task running.
pub struct CallbackServer {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    pub fn spawn(listener: TcpListener, handshake: Arc<LoginHandshake>) -> Self {
        let (tx, rx) = oneshot::channel::<()>();
        let app = router(handshake);
        let task = tokio::spawn(async move {
            if let Ok(addr) = listener.local_addr() {
                info!(target: "identity", "callback relay listening on {}", addr);
            }
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { let _ = rx.await; })
                .await;
            if let Err(e) = served {
                error!(target: "identity", "callback relay error: {}", e);
            }
        });
        Self { shutdown: Some(tx), task }
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}
