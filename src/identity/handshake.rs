//! Single-flight OIDC login handshake.
//!
//! `begin` moves Idle -> Pending: it generates the CSRF state and PKCE pair,
//! stores them in the session, opens the authorization page and arms a
//! one-shot channel. The first same-origin `oidc-callback` message moves the
//! handshake to Resolved or Rejected; every later message is ignored because
//! the pending record is gone. The attempt rejects on its own after `timeout`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::pkce::Pkce;
use super::provider::{authorization_url, BrowserOpener, OidcConfig};
use super::session::{generate_state, SessionStore, STATE_KEY, VERIFIER_KEY};
use crate::error::{AppError, AppResult};

pub const CALLBACK_MESSAGE_TYPE: &str = "oidc-callback";
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cross-window message relayed by the callback page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: CallbackData,
}

impl CallbackMessage {
    pub fn new(data: CallbackData) -> Self {
        Self { kind: CALLBACK_MESSAGE_TYPE.to_string(), data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Pending,
    Resolved,
    Rejected,
}

/// What a delivered message did to the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Ignored,
    Resolved,
    Rejected(AppError),
}

struct Inner {
    state: HandshakeState,
    pending: Option<oneshot::Sender<AppResult<String>>>,
    /// Id of the most recent attempt; a stale attempt must not expire a newer one.
    attempt: u64,
}

pub struct LoginHandshake {
    origin: String,
    store: SessionStore,
    opener: Arc<dyn BrowserOpener>,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl LoginHandshake {
    /// `origin` is where the callback page is served; it is both the redirect
    /// target and the only origin whose messages are accepted.
    pub fn new(origin: &str, store: SessionStore, opener: Arc<dyn BrowserOpener>) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            store,
            opener,
            timeout: LOGIN_TIMEOUT,
            inner: Mutex::new(Inner { state: HandshakeState::Idle, pending: None, attempt: 0 }),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn origin(&self) -> &str { &self.origin }

    pub fn redirect_uri(&self) -> String { format!("{}/callback", self.origin) }

    pub fn store(&self) -> &SessionStore { &self.store }

    pub fn state(&self) -> HandshakeState { self.inner.lock().state }

    /// Run a whole login: open the provider page and wait for the token.
    pub async fn login(&self, cfg: &OidcConfig) -> AppResult<String> {
        self.begin(cfg)?.wait().await
    }

    /// Start a login attempt. Fails if another attempt is still pending.
    pub fn begin(&self, cfg: &OidcConfig) -> AppResult<LoginAttempt<'_>> {
        if !cfg.is_complete() {
            return Err(AppError::config("identity provider URL, realm and client id are required"));
        }
        let mut inner = self.inner.lock();
        if inner.pending.is_some() {
            return Err(AppError::user("a login is already in progress"));
        }

        let state = generate_state()?;
        let pkce = Pkce::generate()?;
        self.store.set(STATE_KEY, &state);
        self.store.set(VERIFIER_KEY, &pkce.verifier);

        let opened = authorization_url(cfg, &self.redirect_uri(), &state, &pkce.challenge)
            .and_then(|url| {
                debug!(target: "identity", "authorization url: {}", url);
                self.opener.open(url.as_str()).map(|_| url)
            });
        let url = match opened {
            Ok(url) => url,
            Err(e) => {
                self.clear_session();
                return Err(e);
            }
        };

        let (tx, rx) = oneshot::channel();
        inner.attempt += 1;
        inner.pending = Some(tx);
        inner.state = HandshakeState::Pending;
        info!(target: "identity", "login pending: realm={} client_id={} timeout={}s", cfg.realm, cfg.client_id, self.timeout.as_secs());
        Ok(LoginAttempt { handshake: self, id: inner.attempt, rx, authorization_url: url })
    }

    /// Deliver a raw cross-window message, as received from `origin`.
    pub fn handle_raw(&self, origin: &str, raw: &Value) -> MessageOutcome {
        match serde_json::from_value::<CallbackMessage>(raw.clone()) {
            Ok(msg) => self.handle_message(origin, &msg),
            Err(_) => MessageOutcome::Ignored,
        }
    }

    pub fn handle_message(&self, origin: &str, msg: &CallbackMessage) -> MessageOutcome {
        if origin.trim_end_matches('/') != self.origin {
            debug!(target: "identity", "ignoring message from foreign origin '{}'", origin);
            return MessageOutcome::Ignored;
        }
        if msg.kind != CALLBACK_MESSAGE_TYPE {
            return MessageOutcome::Ignored;
        }
        let mut inner = self.inner.lock();
        let Some(tx) = inner.pending.take() else {
            debug!(target: "identity", "callback message without a pending login");
            return MessageOutcome::Ignored;
        };

        let saved = self.store.get(STATE_KEY);
        let result = if msg.data.state.is_none() || msg.data.state != saved {
            Err(AppError::csrf("invalid state, possible CSRF attack"))
        } else if let Some(err) = &msg.data.error {
            Err(AppError::provider(err.clone()))
        } else if let Some(token) = &msg.data.token {
            Ok(token.clone())
        } else {
            Err(AppError::provider("callback carried neither a token nor an error"))
        };
        self.clear_session();

        let outcome = match &result {
            Ok(_) => {
                inner.state = HandshakeState::Resolved;
                info!(target: "identity", "login resolved");
                MessageOutcome::Resolved
            }
            Err(e) => {
                inner.state = HandshakeState::Rejected;
                warn!(target: "identity", "login rejected: {}", e);
                MessageOutcome::Rejected(e.clone())
            }
        };
        // The waiting side may already have timed out and dropped its receiver.
        let _ = tx.send(result);
        outcome
    }

    /// Abandon attempt `id` if it is still the pending one.
    fn expire(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.attempt != id { return; }
        if inner.pending.take().is_some() {
            inner.state = HandshakeState::Rejected;
            self.clear_session();
            warn!(target: "identity", "login expired after {}s", self.timeout.as_secs());
        }
    }

    fn clear_session(&self) {
        self.store.remove(STATE_KEY);
        self.store.remove(VERIFIER_KEY);
    }
}

/// A login in flight; await `wait` for its outcome. Dropping an attempt that
/// is still pending expires it and clears the session.
pub struct LoginAttempt<'a> {
    handshake: &'a LoginHandshake,
    id: u64,
    rx: oneshot::Receiver<AppResult<String>>,
    authorization_url: Url,
}

impl LoginAttempt<'_> {
    pub fn authorization_url(&self) -> &Url { &self.authorization_url }

    pub async fn wait(mut self) -> AppResult<String> {
        match tokio::time::timeout(self.handshake.timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::internal("login handshake dropped")),
            Err(_) => {
                self.handshake.expire(self.id);
                Err(AppError::AuthTimeout(self.handshake.timeout.as_secs()))
            }
        }
    }
}

impl Drop for LoginAttempt<'_> {
    fn drop(&mut self) {
        self.handshake.expire(self.id);
    }
}

/// Source of the bearer token used against the publish backend.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> AppResult<String>;
}

/// Interactive OIDC login; every call runs a fresh handshake.
pub struct OidcLogin {
    handshake: Arc<LoginHandshake>,
    config: OidcConfig,
}

impl OidcLogin {
    pub fn new(handshake: Arc<LoginHandshake>, config: OidcConfig) -> Self {
        Self { handshake, config }
    }
}

#[async_trait]
impl TokenSource for OidcLogin {
    async fn bearer_token(&self) -> AppResult<String> {
        self.handshake.login(&self.config).await
    }
}
