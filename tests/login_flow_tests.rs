use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use reqwest::Url;
use serde_json::json;

use grist_superset::error::{AppError, AppResult};
use grist_superset::grist::{AuthInfo, MemoryHost};
use grist_superset::identity::callback::{self, CallbackServer};
use grist_superset::identity::{
    BrowserOpener, HandshakeState, LoginHandshake, OidcConfig, OidcLogin, SessionStore, TokenSource, STATE_KEY,
};
use grist_superset::superset::{PublishClient, Publisher};
use grist_superset::widget::{RecordingView, WidgetConfig, WidgetController, WidgetState};

/// Stands in for the user's browser: follows the authorization URL straight
/// back to the callback relay with the given fragment values.
struct ScriptedBrowser {
    token: Option<&'static str>,
    error: Option<&'static str>,
    tamper_state: bool,
}

impl BrowserOpener for ScriptedBrowser {
    fn open(&self, url: &str) -> AppResult<()> {
        let url = Url::parse(url).map_err(|e| AppError::internal(e.to_string()))?;
        let param = |k: &str| url.query_pairs().find(|(key, _)| key == k).map(|(_, v)| v.into_owned());
        let redirect = param("redirect_uri").unwrap_or_default();
        let mut state = param("state").unwrap_or_default();
        if self.tamper_state {
            state.push('x');
        }
        let origin = redirect.trim_end_matches("/callback").to_string();
        let mut data = json!({"state": state});
        if let Some(t) = self.token { data["token"] = json!(t); }
        if let Some(e) = self.error { data["error"] = json!(e); }
        tokio::spawn(async move {
            let _ = reqwest::Client::new()
                .post(format!("{}/message", origin))
                .header("origin", origin.as_str())
                .json(&json!({"type": "oidc-callback", "data": data}))
                .send()
                .await;
        });
        Ok(())
    }
}

fn oidc() -> OidcConfig {
    OidcConfig { issuer_url: "https://sso.example".into(), realm: "data".into(), client_id: "grist".into() }
}

async fn relay(browser: ScriptedBrowser) -> (Arc<LoginHandshake>, CallbackServer) {
    let (listener, origin) = callback::bind(0).await.unwrap();
    let hs = Arc::new(
        LoginHandshake::new(&origin, SessionStore::new(), Arc::new(browser)).with_timeout(Duration::from_secs(5)),
    );
    let server = CallbackServer::spawn(listener, hs.clone());
    (hs, server)
}

#[tokio::test]
async fn login_resolves_through_the_relay() {
    let (hs, server) = relay(ScriptedBrowser { token: Some("jwt-1"), error: None, tamper_state: false }).await;
    let token = OidcLogin::new(hs.clone(), oidc()).bearer_token().await.unwrap();
    assert_eq!(token, "jwt-1");
    assert_eq!(hs.state(), HandshakeState::Resolved);
    assert!(hs.store().get(STATE_KEY).is_none());
    server.shutdown().await;
}

#[tokio::test]
async fn tampered_state_is_rejected_as_csrf() {
    let (hs, server) = relay(ScriptedBrowser { token: Some("jwt-1"), error: None, tamper_state: true }).await;
    let err = hs.login(&oidc()).await.unwrap_err();
    assert!(matches!(err, AppError::CsrfMismatch(_)));
    assert_eq!(hs.state(), HandshakeState::Rejected);
    server.shutdown().await;
}

#[tokio::test]
async fn provider_error_is_surfaced() {
    let (hs, server) = relay(ScriptedBrowser { token: None, error: Some("access_denied"), tamper_state: false }).await;
    let err = hs.login(&oidc()).await.unwrap_err();
    assert_eq!(err, AppError::Provider("access_denied".into()));
    server.shutdown().await;
}

#[tokio::test]
async fn widget_publishes_after_interactive_login() {
    let mut backend = Server::new_async().await;
    let _columns = backend
        .mock("GET", "/api/docs/doc1/tables/Sales/columns")
        .match_query(Matcher::Any)
        .with_body(r#"{"columns":[{"id":"code","fields":{"label":"Code","type":"Text"}},{"id":"day","fields":{"label":"Day","type":"Date"}}]}"#)
        .create_async()
        .await;
    let publish = backend
        .mock("POST", "/to-superset/publish")
        .match_header("authorization", "Bearer jwt-2")
        .with_body(r#"{"success":true,"message":"Import OK","rows_imported":1}"#)
        .create_async()
        .await;

    let host = MemoryHost::new(
        Some(AuthInfo { base_url: format!("{}/api/docs/doc1", backend.url()), token: "tok".into() }),
        Some("Sales"),
    );
    if let serde_json::Value::Object(map) = json!({"code": ["a"], "day": [0]}) {
        host.insert_table("Sales", map);
    }
    let publisher = Publisher::new(Arc::new(host), PublishClient::new(&backend.url()).unwrap());
    let (hs, server) = relay(ScriptedBrowser { token: Some("jwt-2"), error: None, tamper_state: false }).await;
    let view = Arc::new(RecordingView::new());
    let controller = WidgetController::new(WidgetConfig::default(), publisher, Arc::new(OidcLogin::new(hs, oidc())), view.clone());

    controller.init().await.unwrap();
    assert_eq!(view.options("indexColumn").len(), 1);
    controller.select(Some("code")).unwrap();
    controller.submit().await.unwrap();

    assert_eq!(controller.state(), WidgetState::Success("Import OK (1 rows imported)".into()));
    assert!(view.is_visible("successBloc"));
    assert!(!view.is_visible("loadingBloc"));
    publish.assert_async().await;
    server.shutdown().await;
}
