//!
//! Publish backend client
//! ----------------------
//! Sends Grist tables to the Superset publishing backend. Unlike the Grist REST
//! client this one authenticates with the OIDC bearer token in the
//! `Authorization` header.
//!
//! Error bodies are reduced to one user-facing message, looking at `message`,
//! then `detail` (stringified when structured), then `error`, then the HTTP status.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde_json::Value;
use tracing::{error, info};

use crate::error::{AppError, AppResult};
use crate::export::{build_csv, filter_columns, index_count, normalize_columns, ColumnManifestEntry};
use crate::grist::{fetch_rows, get_columns_for_table, GristRestClient, HostApi, Row, ColumnDescriptor};

pub const PUBLISH_PATH: &str = "to-superset/publish";
pub const LINK_PATH: &str = "to-superset/link";

/// Everything sent for one publish attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishPayload {
    pub table_id: String,
    pub csv: String,
    pub columns: Vec<ColumnManifestEntry>,
}

impl PublishPayload {
    pub async fn build(table_id: &str, index_column_id: &str, columns: &[ColumnDescriptor], rows: &[Row]) -> AppResult<Self> {
        let csv = build_csv(columns, rows).await?;
        let manifest = normalize_columns(columns, index_column_id);
        Ok(Self { table_id: table_id.to_string(), csv, columns: manifest })
    }

    pub fn file_name(&self) -> String { format!("{}.csv", self.table_id) }

    pub fn has_single_index(&self) -> bool { index_count(&self.columns) == 1 }
}

/// Reduce a non-success response body to the message shown to the user.
pub fn parse_error_message(status: u16, body: &str) -> String {
    let fallback = format!("HTTP error {}", status);
    let Ok(v) = serde_json::from_str::<Value>(body) else { return fallback };
    if let Some(m) = non_empty(v.get("message")) {
        return text_of(m);
    }
    if let Some(d) = non_empty(v.get("detail")) {
        return match d {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    if let Some(e) = non_empty(v.get("error")) {
        return text_of(e);
    }
    fallback
}

fn non_empty(v: Option<&Value>) -> Option<&Value> {
    match v {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(other) => Some(other),
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// HTTP client for the publish backend.
#[derive(Clone)]
pub struct PublishClient {
    base: String,
    client: reqwest::Client,
}

impl PublishClient {
    pub fn new(base_url: &str) -> AppResult<Self> {
        Url::parse(base_url).map_err(|e| AppError::config(format!("invalid publish backend URL '{}': {}", base_url, e)))?;
        Ok(Self { base: base_url.trim_end_matches('/').to_string(), client: reqwest::Client::new() })
    }

    fn endpoint(&self, path: &str) -> String { format!("{}/{}", self.base, path) }

    pub async fn publish(&self, payload: &PublishPayload, bearer: &str) -> AppResult<Value> {
        let file = Part::text(payload.csv.clone())
            .file_name(payload.file_name())
            .mime_str("text/csv")?;
        let form = Form::new()
            .part("file", file)
            .text("tableId", payload.table_id.clone())
            .text("columns", serde_json::to_string(&payload.columns)?);
        info!(target: "superset", "publishing table '{}' ({} bytes, {} columns)", payload.table_id, payload.csv.len(), payload.columns.len());
        self.post_form(PUBLISH_PATH, form, bearer).await
            .inspect_err(|e| error!(target: "superset", "publish of '{}' failed: {}", payload.table_id, e))
    }

    pub async fn link(&self, table_id: &str, bearer: &str) -> AppResult<Value> {
        let form = Form::new().text("tableId", table_id.to_string());
        info!(target: "superset", "linking table '{}'", table_id);
        self.post_form(LINK_PATH, form, bearer).await
            .inspect_err(|e| error!(target: "superset", "link of '{}' failed: {}", table_id, e))
    }

    async fn post_form(&self, path: &str, form: Form, bearer: &str) -> AppResult<Value> {
        let resp = self.client
            .post(self.endpoint(path))
            .bearer_auth(bearer)
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::publish(parse_error_message(status.as_u16(), &body)));
        }
        Ok(resp.json::<Value>().await?)
    }
}

/// Fetch, package and send a table; also links tables already published.
#[derive(Clone)]
pub struct Publisher {
    host: Arc<dyn HostApi>,
    rest: GristRestClient,
    client: PublishClient,
}

impl Publisher {
    pub fn new(host: Arc<dyn HostApi>, client: PublishClient) -> Self {
        let rest = GristRestClient::new(host.clone());
        Self { host, rest, client }
    }

    pub fn host(&self) -> &Arc<dyn HostApi> { &self.host }

    pub async fn columns(&self, table_id: &str) -> AppResult<Vec<ColumnDescriptor>> {
        get_columns_for_table(&self.rest, table_id).await
    }

    /// Build the payload without sending it.
    pub async fn prepare(&self, table_id: &str, index_column_id: &str) -> AppResult<PublishPayload> {
        let columns = filter_columns(self.columns(table_id).await?);
        let rows = fetch_rows(self.host.as_ref(), Some(table_id), &columns).await?;
        let payload = PublishPayload::build(table_id, index_column_id, &columns, &rows).await?;
        if !payload.has_single_index() {
            return Err(AppError::user(format!("index column '{}' is not a publishable column of '{}'", index_column_id, table_id)));
        }
        Ok(payload)
    }

    pub async fn publish(&self, table_id: &str, index_column_id: &str, bearer: &str) -> AppResult<Value> {
        let payload = self.prepare(table_id, index_column_id).await?;
        self.client.publish(&payload, bearer).await
    }

    pub async fn link(&self, table_id: &str, bearer: &str) -> AppResult<Value> {
        self.client.link(table_id, bearer).await
    }
}

/// One-line summary of a successful publish response.
pub fn summarize_response(v: &Value) -> String {
    let message = v.get("message").and_then(|m| m.as_str()).unwrap_or("published");
    match v.get("rows_imported").and_then(|r| r.as_u64()) {
        Some(n) => format!("{} ({} rows imported)", message, n),
        None => message.to_string(),
    }
}
