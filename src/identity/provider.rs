use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// Identity provider coordinates injected through configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub realm: String,
    pub client_id: String,
}

impl OidcConfig {
    pub fn is_complete(&self) -> bool {
        !self.issuer_url.is_empty() && !self.realm.is_empty() && !self.client_id.is_empty()
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}/realms/{}/protocol/openid-connect/auth", self.issuer_url.trim_end_matches('/'), self.realm)
    }
}

/// Implicit-flow authorization URL carrying the CSRF state and the PKCE challenge.
pub fn authorization_url(cfg: &OidcConfig, redirect_uri: &str, state: &str, code_challenge: &str) -> AppResult<Url> {
    let endpoint = cfg.authorization_endpoint();
    Url::parse_with_params(
        &endpoint,
        &[
            ("client_id", cfg.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "token"),
            ("scope", "openid profile email"),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| AppError::config(format!("invalid identity provider URL '{}': {}", endpoint, e)))
}

/// Opens the authorization URL in a separate window.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> AppResult<()>;
}

/// Opens the user's default browser, falling back to printing the URL.
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> AppResult<()> {
        info!(target: "identity", "opening identity provider login page");
        if let Err(e) = open::that(url) {
            warn!(target: "identity", "could not open a browser automatically: {}", e);
            eprintln!("Open this URL to sign in:\n  {}", url);
        }
        Ok(())
    }
}
