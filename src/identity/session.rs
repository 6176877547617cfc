use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use parking_lot::RwLock;

use crate::error::{AppError, AppResult};
use crate::tprintln;

/// Key holding the CSRF state of the login in flight.
pub const STATE_KEY: &str = "oidc_state";
/// Key holding the PKCE verifier of the login in flight.
pub const VERIFIER_KEY: &str = "oidc_verifier";

/// Per-session key/value storage scoped to one widget instance.
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionStore {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &str) -> Option<String> { self.inner.read().get(key).cloned() }

    pub fn set(&self, key: &str, value: &str) {
        tprintln!("session.set key={}", key);
        self.inner.write().insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) -> Option<String> { self.inner.write().remove(key) }

    pub fn len(&self) -> usize { self.inner.read().len() }

    pub fn is_empty(&self) -> bool { self.inner.read().is_empty() }
}

pub(crate) fn random_bytes(len: usize) -> AppResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::internal(format!("random source unavailable: {}", e)))?;
    Ok(buf)
}

/// Random CSRF state: 128 bits, base64url without padding.
pub fn generate_state() -> AppResult<String> {
    let buf = random_bytes(16)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}
