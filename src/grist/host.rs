use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, error, info};

use super::types::{AccessLevel, AuthInfo, ColumnDescriptor, Row, TableData};
use crate::error::{AppError, AppResult};
use crate::export::sanitize_value;

/// Surface of the embedding platform consumed by the widget.
/// Record-change notifications are not part of it; rows are read on publish.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Readiness handshake declaring the permission level the widget needs.
    async fn ready(&self, access: AccessLevel) -> AppResult<()>;
    async fn access_token(&self, read_only: bool) -> AppResult<AuthInfo>;
    /// Column-oriented contents of a table, keyed by column id.
    async fn fetch_table(&self, table_id: &str) -> AppResult<TableData>;
    /// Table the widget is attached to, if any.
    async fn selected_table_id(&self) -> AppResult<Option<String>>;
}

/// Resolve the REST base URL and a read-only token.
/// Any host failure is reported as `HostAuth` and never retried.
pub async fn get_auth_info(host: &dyn HostApi) -> AppResult<AuthInfo> {
    match host.access_token(true).await {
        Ok(info) if info.token.is_empty() => Err(AppError::host_auth("host returned an empty access token")),
        Ok(info) => Ok(info),
        Err(e @ AppError::HostAuth(_)) => {
            error!(target: "grist", "access token request denied: {}", e);
            Err(e)
        }
        Err(e) => {
            error!(target: "grist", "access token request failed: {}", e);
            Err(AppError::host_auth(e.message()))
        }
    }
}

/// Fetch the rows of `table_id` restricted to `columns_to_keep`.
///
/// Values are read from each column's display column when it has one, and
/// list cells are flattened. Row count follows the first available column.
pub async fn fetch_rows(host: &dyn HostApi, table_id: Option<&str>, columns_to_keep: &[ColumnDescriptor]) -> AppResult<Vec<Row>> {
    let Some(table_id) = table_id else { return Ok(Vec::new()) };
    let data = host.fetch_table(table_id).await?;

    let available: Vec<&ColumnDescriptor> = columns_to_keep.iter().filter(|c| data.contains_key(&c.id)).collect();
    let row_count = available
        .first()
        .and_then(|c| data.get(&c.id))
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    debug!(target: "grist", "fetch_rows table={} columns={} rows={}", table_id, available.len(), row_count);

    let mut rows = Vec::with_capacity(row_count);
    for i in 0..row_count {
        let mut row = Row::new();
        for col in &available {
            let values = data.get(col.source_col_id()).or_else(|| data.get(&col.id));
            let cell = values.and_then(|v| v.get(i)).cloned().unwrap_or(Value::Null);
            row.insert(col.id.clone(), sanitize_value(&cell));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Host backed by a Grist server's REST API and a document API key.
#[derive(Clone)]
pub struct GristHost {
    server: String,
    doc_id: String,
    api_key: Option<String>,
    table_id: Option<String>,
    client: reqwest::Client,
}

impl GristHost {
    pub fn new(server: &str, doc_id: &str, api_key: Option<String>, table_id: Option<String>) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            doc_id: doc_id.to_string(),
            api_key,
            table_id,
            client: reqwest::Client::new(),
        }
    }

    fn doc_url(&self) -> String { format!("{}/api/docs/{}", self.server, self.doc_id) }

    fn headers(&self) -> AppResult<HeaderMap> {
        let key = self.api_key.as_deref().ok_or_else(|| AppError::host_auth("no Grist API key configured"))?;
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|_| AppError::config("Grist API key contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn get_json(&self, url: &str) -> AppResult<Value> {
        let resp = self.client.get(url).headers(self.headers()?).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl HostApi for GristHost {
    async fn ready(&self, access: AccessLevel) -> AppResult<()> {
        info!(target: "grist", "widget ready: doc={} requiredAccess='{}'", self.doc_id, access.as_str());
        if access != AccessLevel::None && self.api_key.is_none() {
            return Err(AppError::host_auth(format!("access '{}' requires a Grist API key", access.as_str())));
        }
        Ok(())
    }

    async fn access_token(&self, read_only: bool) -> AppResult<AuthInfo> {
        let token = self.api_key.clone().ok_or_else(|| AppError::host_auth("no Grist API key configured"))?;
        debug!(target: "grist", "issuing access token read_only={}", read_only);
        Ok(AuthInfo { base_url: self.doc_url(), token })
    }

    async fn fetch_table(&self, table_id: &str) -> AppResult<TableData> {
        let url = format!("{}/tables/{}/data", self.doc_url(), urlencoding::encode(table_id));
        match self.get_json(&url).await? {
            Value::Object(map) => Ok(map),
            other => Err(AppError::internal(format!("unexpected table payload for '{}': {}", table_id, other))),
        }
    }

    async fn selected_table_id(&self) -> AppResult<Option<String>> { Ok(self.table_id.clone()) }
}

/// Host serving fixed tables from memory, with the REST API living at `base_url`.
/// Used for offline exports and in tests.
pub struct MemoryHost {
    auth: Option<AuthInfo>,
    tables: RwLock<HashMap<String, TableData>>,
    selected: Option<String>,
    readiness: RwLock<Vec<AccessLevel>>,
}

impl MemoryHost {
    pub fn new(auth: Option<AuthInfo>, selected: Option<&str>) -> Self {
        Self {
            auth,
            tables: RwLock::new(HashMap::new()),
            selected: selected.map(|s| s.to_string()),
            readiness: RwLock::new(Vec::new()),
        }
    }

    pub fn insert_table(&self, table_id: &str, data: TableData) {
        self.tables.write().insert(table_id.to_string(), data);
    }

    /// Access levels declared through `ready`, in call order.
    pub fn readiness_calls(&self) -> Vec<AccessLevel> { self.readiness.read().clone() }
}

#[async_trait]
impl HostApi for MemoryHost {
    async fn ready(&self, access: AccessLevel) -> AppResult<()> {
        self.readiness.write().push(access);
        Ok(())
    }

    async fn access_token(&self, _read_only: bool) -> AppResult<AuthInfo> {
        self.auth.clone().ok_or_else(|| AppError::host_auth("access token denied"))
    }

    async fn fetch_table(&self, table_id: &str) -> AppResult<TableData> {
        self.tables
            .read()
            .get(table_id)
            .cloned()
            .ok_or_else(|| AppError::Api { status: 404, status_text: "Not Found".into(), body: format!("table '{}' not found", table_id) })
    }

    async fn selected_table_id(&self) -> AppResult<Option<String>> { Ok(self.selected.clone()) }
}
