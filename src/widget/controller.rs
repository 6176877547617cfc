//! Publish widget controller.
//!
//! Drives Loading -> Form -> Submitting -> Success | Error. Metadata is loaded
//! once by `init`; if that fails the widget stays in Error and never publishes.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, warn};

use super::state::{ColumnChoice, WidgetConfig, WidgetState};
use super::view::WidgetView;
use crate::error::{AppError, AppResult};
use crate::export::filter_columns;
use crate::identity::TokenSource;
use crate::superset::{summarize_response, Publisher};

struct Inner {
    state: WidgetState,
    table_id: Option<String>,
    choices: Vec<ColumnChoice>,
    selected: Option<String>,
    locked: bool,
}

pub struct WidgetController {
    config: WidgetConfig,
    publisher: Publisher,
    tokens: Arc<dyn TokenSource>,
    view: Arc<dyn WidgetView>,
    inner: Mutex<Inner>,
}

impl WidgetController {
    pub fn new(config: WidgetConfig, publisher: Publisher, tokens: Arc<dyn TokenSource>, view: Arc<dyn WidgetView>) -> Self {
        Self {
            config,
            publisher,
            tokens,
            view,
            inner: Mutex::new(Inner { state: WidgetState::Loading, table_id: None, choices: Vec::new(), selected: None, locked: false }),
        }
    }

    pub fn state(&self) -> WidgetState { self.inner.lock().state.clone() }

    pub fn choices(&self) -> Vec<ColumnChoice> { self.inner.lock().choices.clone() }

    pub fn selected(&self) -> Option<String> { self.inner.lock().selected.clone() }

    pub fn table_id(&self) -> Option<String> { self.inner.lock().table_id.clone() }

    /// Readiness handshake, then load the attached table's eligible index columns.
    pub async fn init(&self) -> AppResult<()> {
        self.transition(WidgetState::Loading);
        match self.load_choices().await {
            Ok((table_id, choices)) => {
                info!(target: "widget", "table '{}' has {} eligible index column(s)", table_id, choices.len());
                self.view.set_options(&self.config.elements.column_select, &choices);
                if choices.is_empty() {
                    self.view.set_text(&self.config.elements.result, "No column of an allowed type can be used as index.");
                }
                {
                    let mut inner = self.inner.lock();
                    inner.table_id = Some(table_id);
                    inner.choices = choices;
                    inner.selected = None;
                }
                self.transition(WidgetState::Form);
                Ok(())
            }
            Err(e) => {
                error!(target: "widget", "failed to load table metadata: {}", e);
                self.inner.lock().locked = true;
                self.transition(WidgetState::Error(e.message()));
                Err(e)
            }
        }
    }

    async fn load_choices(&self) -> AppResult<(String, Vec<ColumnChoice>)> {
        let host = self.publisher.host();
        host.ready(self.config.access).await?;
        let table_id = host
            .selected_table_id()
            .await?
            .ok_or_else(|| AppError::user("no table is attached to the widget"))?;
        let columns = filter_columns(self.publisher.columns(&table_id).await?);
        let choices = columns
            .iter()
            .filter(|c| self.config.allows(c.base_type()))
            .map(|c| ColumnChoice { id: c.id.clone(), label: c.fields.label.clone(), col_type: c.type_tag().to_string() })
            .collect();
        Ok((table_id, choices))
    }

    /// Pick the index column; `None` clears the selection.
    pub fn select(&self, column_id: Option<&str>) -> AppResult<()> {
        {
            let mut inner = self.inner.lock();
            match column_id {
                Some(id) if !inner.choices.iter().any(|c| c.id == id) => {
                    return Err(AppError::user(format!("'{}' is not an eligible index column", id)));
                }
                other => inner.selected = other.map(|s| s.to_string()),
            }
        }
        self.refresh_controls();
        Ok(())
    }

    /// Log in, then publish the table with the selected index column.
    pub async fn submit(&self) -> AppResult<Value> {
        let (table_id, index) = {
            let mut inner = self.inner.lock();
            self.check_can_act(&inner)?;
            let index = inner.selected.clone().ok_or_else(|| AppError::user("select an index column first"))?;
            inner.state = WidgetState::Submitting;
            (inner.table_id.clone().unwrap_or_default(), index)
        };
        self.render();
        info!(target: "widget", "publishing '{}' with index '{}'", table_id, index);

        let result = match self.tokens.bearer_token().await {
            Ok(token) => self.publisher.publish(&table_id, &index, &token).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    /// Log in, then link a table published earlier.
    pub async fn link(&self) -> AppResult<Value> {
        let table_id = {
            let mut inner = self.inner.lock();
            self.check_can_act(&inner)?;
            inner.state = WidgetState::Submitting;
            inner.table_id.clone().unwrap_or_default()
        };
        self.render();
        info!(target: "widget", "linking '{}'", table_id);

        let result = match self.tokens.bearer_token().await {
            Ok(token) => self.publisher.link(&table_id, &token).await,
            Err(e) => Err(e),
        };
        self.finish(result)
    }

    fn check_can_act(&self, inner: &Inner) -> AppResult<()> {
        if inner.locked {
            return Err(AppError::user("publishing is disabled because table metadata could not be loaded"));
        }
        match inner.state {
            WidgetState::Submitting => Err(AppError::user("a submission is already in progress")),
            WidgetState::Loading => Err(AppError::user("the widget is still loading")),
            _ => Ok(()),
        }
    }

    fn finish(&self, result: AppResult<Value>) -> AppResult<Value> {
        match &result {
            Ok(v) => self.transition(WidgetState::Success(summarize_response(v))),
            Err(e) if e.is_login_failure() => {
                warn!(target: "widget", "login failed, nothing was sent: {}", e);
                self.transition(WidgetState::Error(e.message()));
            }
            Err(e) => {
                warn!(target: "widget", "submission failed: {}", e);
                self.transition(WidgetState::Error(e.message()));
            }
        }
        result
    }

    fn transition(&self, next: WidgetState) {
        self.inner.lock().state = next;
        self.render();
    }

    fn render(&self) {
        let ids = &self.config.elements;
        let state = self.state();
        self.view.set_visible(&ids.loading, state.is_busy());
        self.view.set_visible(&ids.form, !matches!(state, WidgetState::Loading));
        self.view.set_visible(&ids.success, matches!(state, WidgetState::Success(_)));
        self.view.set_visible(&ids.error, matches!(state, WidgetState::Error(_)));
        match &state {
            WidgetState::Success(msg) => self.view.set_text(&ids.success, msg),
            WidgetState::Error(msg) => self.view.set_text(&ids.error, msg),
            _ => {}
        }
        self.refresh_controls();
    }

    fn refresh_controls(&self) {
        let ids = &self.config.elements;
        let (can_submit, can_link) = {
            let inner = self.inner.lock();
            let idle = !inner.locked && !inner.state.is_busy();
            (idle && inner.selected.is_some(), idle && inner.table_id.is_some())
        };
        self.view.set_enabled(&ids.submit, can_submit);
        self.view.set_enabled(&ids.link, can_link);
        self.view.set_enabled(&ids.column_select, can_link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grist::{AuthInfo, MemoryHost};
    use crate::superset::PublishClient;
    use crate::widget::RecordingView;
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedToken(AtomicUsize);

    #[async_trait]
    impl TokenSource for FixedToken {
        async fn bearer_token(&self) -> AppResult<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("jwt".to_string())
        }
    }

    struct DeniedLogin;

    #[async_trait]
    impl TokenSource for DeniedLogin {
        async fn bearer_token(&self) -> AppResult<String> {
            Err(AppError::provider("access_denied"))
        }
    }

    const COLUMNS: &str = r#"{"columns":[
        {"id":"code","fields":{"label":"Code","type":"Text"}},
        {"id":"amount","fields":{"label":"Amount","type":"Numeric"}},
        {"id":"day","fields":{"label":"Day","type":"Date"}},
        {"id":"owner","fields":{"label":"Owner","type":"Ref:People"}}
    ]}"#;

    fn host(base: &str, selected: Option<&str>) -> Arc<MemoryHost> {
        let host = MemoryHost::new(Some(AuthInfo { base_url: format!("{}/api/docs/d", base), token: "tok".into() }), selected);
        if let serde_json::Value::Object(map) = json!({"code": ["a", "b"], "amount": [1, 2], "day": [0, 86400], "owner": [1, 1]}) {
            host.insert_table("Sales", map);
        }
        Arc::new(host)
    }

    fn controller(base: &str, host: Arc<MemoryHost>, tokens: Arc<dyn TokenSource>) -> (WidgetController, Arc<RecordingView>) {
        let view = Arc::new(RecordingView::new());
        let publisher = Publisher::new(host, PublishClient::new(base).unwrap());
        (WidgetController::new(WidgetConfig::default(), publisher, tokens, view.clone()), view)
    }

    #[tokio::test]
    async fn init_lists_only_allowed_types_and_waits_for_selection() {
        let mut server = Server::new_async().await;
        let _cols = server
            .mock("GET", "/api/docs/d/tables/Sales/columns")
            .match_query(Matcher::Any)
            .with_body(COLUMNS)
            .create_async()
            .await;
        let h = host(&server.url(), Some("Sales"));
        let (ctl, view) = controller(&server.url(), h.clone(), Arc::new(FixedToken(AtomicUsize::new(0))));

        ctl.init().await.unwrap();
        assert_eq!(ctl.state(), WidgetState::Form);
        let ids: Vec<String> = ctl.choices().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["code", "amount"]);
        assert_eq!(view.options("indexColumn").len(), 2);
        assert!(!view.is_enabled("submitBtn"));
        assert_eq!(h.readiness_calls(), vec![crate::grist::AccessLevel::Full]);

        ctl.select(Some("amount")).unwrap();
        assert!(view.is_enabled("submitBtn"));
        assert!(matches!(ctl.select(Some("day")), Err(AppError::UserInput(_))));
        assert_eq!(ctl.selected().as_deref(), Some("amount"));
    }

    #[tokio::test]
    async fn metadata_failure_disables_publishing() {
        let mut server = Server::new_async().await;
        let _cols = server
            .mock("GET", "/api/docs/d/tables/Sales/columns")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let tokens = Arc::new(FixedToken(AtomicUsize::new(0)));
        let (ctl, view) = controller(&server.url(), host(&server.url(), Some("Sales")), tokens.clone());

        assert!(ctl.init().await.is_err());
        assert!(matches!(ctl.state(), WidgetState::Error(_)));
        assert!(view.is_visible("errorBloc"));
        assert!(!view.is_enabled("submitBtn"));
        assert!(ctl.submit().await.is_err());
        assert_eq!(tokens.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_table_is_an_error_state() {
        let server = Server::new_async().await;
        let (ctl, _view) = controller(&server.url(), host(&server.url(), None), Arc::new(FixedToken(AtomicUsize::new(0))));
        assert!(matches!(ctl.init().await, Err(AppError::UserInput(_))));
        assert!(matches!(ctl.state(), WidgetState::Error(_)));
    }

    #[tokio::test]
    async fn submit_logs_in_then_publishes() {
        let mut server = Server::new_async().await;
        let _cols = server
            .mock("GET", "/api/docs/d/tables/Sales/columns")
            .match_query(Matcher::Any)
            .with_body(COLUMNS)
            .create_async()
            .await;
        let publish = server
            .mock("POST", "/to-superset/publish")
            .match_header("authorization", "Bearer jwt")
            .with_body(r#"{"success":true,"message":"Import OK","rows_imported":2}"#)
            .create_async()
            .await;
        let tokens = Arc::new(FixedToken(AtomicUsize::new(0)));
        let (ctl, view) = controller(&server.url(), host(&server.url(), Some("Sales")), tokens.clone());

        ctl.init().await.unwrap();
        assert!(matches!(ctl.submit().await, Err(AppError::UserInput(_))));
        ctl.select(Some("code")).unwrap();
        let v = ctl.submit().await.unwrap();
        assert_eq!(v["rows_imported"], 2);
        assert_eq!(ctl.state(), WidgetState::Success("Import OK (2 rows imported)".into()));
        assert_eq!(view.text("successBloc").as_deref(), Some("Import OK (2 rows imported)"));
        assert_eq!(tokens.0.load(Ordering::SeqCst), 1);
        publish.assert_async().await;
    }

    #[tokio::test]
    async fn login_failure_never_reaches_backend() {
        let mut server = Server::new_async().await;
        let _cols = server
            .mock("GET", "/api/docs/d/tables/Sales/columns")
            .match_query(Matcher::Any)
            .with_body(COLUMNS)
            .create_async()
            .await;
        let publish = server.mock("POST", "/to-superset/publish").expect(0).create_async().await;
        let (ctl, view) = controller(&server.url(), host(&server.url(), Some("Sales")), Arc::new(DeniedLogin));

        ctl.init().await.unwrap();
        ctl.select(Some("code")).unwrap();
        assert!(matches!(ctl.submit().await, Err(AppError::Provider(_))));
        assert_eq!(view.text("errorBloc").as_deref(), Some("access_denied"));
        publish.assert_async().await;
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn submit_runs_on_a_spawned_task() {
        let mut server = Server::new_async().await;
        let _cols = server
            .mock("GET", "/api/docs/d/tables/Sales/columns")
            .match_query(Matcher::Any)
            .with_body(COLUMNS)
            .create_async()
            .await;
        let _publish = server
            .mock("POST", "/to-superset/publish")
            .with_body(r#"{"success":true,"message":"Import OK"}"#)
            .create_async()
            .await;
        let (ctl, _view) = controller(&server.url(), host(&server.url(), Some("Sales")), Arc::new(FixedToken(AtomicUsize::new(0))));
        let ctl = Arc::new(ctl);
        ctl.init().await.unwrap();
        ctl.select(Some("code")).unwrap();
        assert_send(&ctl.link());

        let task = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.submit().await }
        });
        assert_eq!(task.await.unwrap().unwrap()["message"], "Import OK");
    }

    #[tokio::test]
    async fn second_submit_sees_the_first_one_in_flight() {
        struct SlowToken;
        #[async_trait]
        impl TokenSource for SlowToken {
            async fn bearer_token(&self) -> AppResult<String> {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Err(AppError::provider("access_denied"))
            }
        }
        let mut server = Server::new_async().await;
        let _cols = server
            .mock("GET", "/api/docs/d/tables/Sales/columns")
            .match_query(Matcher::Any)
            .with_body(COLUMNS)
            .create_async()
            .await;
        let (ctl, _view) = controller(&server.url(), host(&server.url(), Some("Sales")), Arc::new(SlowToken));
        ctl.init().await.unwrap();
        ctl.select(Some("code")).unwrap();

        let (first, second) = tokio::join!(ctl.submit(), ctl.submit());
        assert!(matches!(first, Err(AppError::Provider(_))));
        assert_eq!(second.unwrap_err().message(), "a submission is already in progress");
    }

    #[tokio::test]
    async fn duplicate_submit_is_rejected_while_submitting() {
        let server = Server::new_async().await;
        let (ctl, _view) = controller(&server.url(), host(&server.url(), Some("Sales")), Arc::new(FixedToken(AtomicUsize::new(0))));
        {
            let mut inner = ctl.inner.lock();
            inner.state = WidgetState::Submitting;
            inner.table_id = Some("Sales".into());
            inner.selected = Some("code".into());
        }
        let err = ctl.submit().await.unwrap_err();
        assert_eq!(err.message(), "a submission is already in progress");
        assert!(ctl.link().await.is_err());
    }
}
