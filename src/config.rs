//! Runtime settings read from the environment, with command-line overrides.

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::identity::OidcConfig;
use crate::widget::{WidgetConfig, DEFAULT_INDEX_TYPES};

pub const DEFAULT_GRIST_SERVER: &str = "http://localhost:8484";
pub const DEFAULT_CALLBACK_PORT: u16 = 8765;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub grist_server: String,
    pub doc_id: String,
    pub api_key: Option<String>,
    pub table_id: Option<String>,
    pub publish_url: String,
    pub oidc: OidcConfig,
    pub callback_port: u16,
    pub index_types: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grist_server: DEFAULT_GRIST_SERVER.to_string(),
            doc_id: String::new(),
            api_key: None,
            table_id: None,
            publish_url: String::new(),
            oidc: OidcConfig::default(),
            callback_port: DEFAULT_CALLBACK_PORT,
            index_types: DEFAULT_INDEX_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_port(v: &str) -> AppResult<u16> {
    v.trim().parse::<u16>().map_err(|_| AppError::config(format!("invalid callback port '{}'", v)))
}

fn parse_types(v: &str) -> Vec<String> {
    v.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
}

impl Settings {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(v) = non_empty(get("GRIST_SERVER")) { s.grist_server = v; }
        if let Some(v) = non_empty(get("GRIST_DOC_ID")) { s.doc_id = v; }
        s.api_key = non_empty(get("GRIST_API_KEY"));
        s.table_id = non_empty(get("GRIST_TABLE_ID"));
        if let Some(v) = non_empty(get("SUPERSET_PUBLISH_URL")) { s.publish_url = v; }
        if let Some(v) = non_empty(get("OIDC_ISSUER_URL")) { s.oidc.issuer_url = v; }
        if let Some(v) = non_empty(get("OIDC_REALM")) { s.oidc.realm = v; }
        if let Some(v) = non_empty(get("OIDC_CLIENT_ID")) { s.oidc.client_id = v; }
        if let Some(v) = non_empty(get("OIDC_CALLBACK_PORT")) { s.callback_port = parse_port(&v)?; }
        if let Some(v) = non_empty(get("INDEX_COLUMN_TYPES")) {
            let types = parse_types(&v);
            if !types.is_empty() { s.index_types = types; }
        }
        debug!(target: "config", "settings: server={} doc={} table={:?} publish_url={} realm={}", s.grist_server, s.doc_id, s.table_id, s.publish_url, s.oidc.realm);
        Ok(s)
    }

    /// Apply one `--flag value` override. Returns false for flags it does not own.
    pub fn apply_flag(&mut self, flag: &str, value: &str) -> AppResult<bool> {
        match flag {
            "--server" => self.grist_server = value.to_string(),
            "--doc" => self.doc_id = value.to_string(),
            "--api-key" => self.api_key = Some(value.to_string()),
            "--table" => self.table_id = Some(value.to_string()),
            "--publish-url" => self.publish_url = value.to_string(),
            "--issuer" => self.oidc.issuer_url = value.to_string(),
            "--realm" => self.oidc.realm = value.to_string(),
            "--client-id" => self.oidc.client_id = value.to_string(),
            "--callback-port" => self.callback_port = parse_port(value)?,
            "--index-types" => {
                let types = parse_types(value);
                if types.is_empty() {
                    return Err(AppError::config("--index-types needs at least one type"));
                }
                self.index_types = types;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn require_document(&self) -> AppResult<()> {
        if self.doc_id.is_empty() {
            return Err(AppError::config("a document id is required (GRIST_DOC_ID or --doc)"));
        }
        Ok(())
    }

    pub fn require_publish(&self) -> AppResult<()> {
        self.require_document()?;
        if self.publish_url.is_empty() {
            return Err(AppError::config("a publish backend URL is required (SUPERSET_PUBLISH_URL or --publish-url)"));
        }
        self.require_oidc()
    }

    pub fn require_oidc(&self) -> AppResult<()> {
        if !self.oidc.is_complete() {
            return Err(AppError::config("OIDC_ISSUER_URL, OIDC_REALM and OIDC_CLIENT_ID are required"));
        }
        Ok(())
    }

    pub fn widget_config(&self) -> WidgetConfig {
        WidgetConfig::default().with_index_types(self.index_types.iter().cloned())
    }
}
