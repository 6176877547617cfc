//! OIDC login for the publish widget.
//! Keep the public surface thin and split implementation across sub-modules.

mod session;
mod pkce;
mod provider;
mod handshake;
pub mod callback;

pub use session::{SessionStore, generate_state, STATE_KEY, VERIFIER_KEY};
pub use pkce::{Pkce, code_challenge, random_string, VERIFIER_LEN};
pub use provider::{OidcConfig, BrowserOpener, SystemBrowser, authorization_url};
pub use handshake::{
    LoginHandshake, LoginAttempt, OidcLogin, TokenSource, HandshakeState, MessageOutcome,
    CallbackMessage, CallbackData, CALLBACK_MESSAGE_TYPE, LOGIN_TIMEOUT,
};
