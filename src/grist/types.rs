use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type tags starting with this prefix point at another table.
pub const REFERENCE_TYPE_PREFIX: &str = "Ref:";

/// Column-oriented table contents as returned by the host: column id -> cell values.
pub type TableData = Map<String, Value>;

/// One exported row: column id -> cell, in column order.
pub type Row = Map<String, Value>;

/// Access level a widget declares during the readiness handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    None,
    ReadTable,
    Full,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::ReadTable => "read table",
            AccessLevel::Full => "full",
        }
    }
}

/// Base URL of the document REST API and the token to append as `auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnFields {
    #[serde(default)]
    pub label: String,
    /// Raw type tag, e.g. `Numeric`, `DateTime:Europe/Madrid`, `Ref:People`.
    #[serde(rename = "type", default)]
    pub col_type: String,
    #[serde(rename = "displayColId", default, skip_serializing_if = "Option::is_none")]
    pub display_col_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDescriptor {
    pub id: String,
    #[serde(default)]
    pub fields: ColumnFields,
}

impl ColumnDescriptor {
    pub fn new(id: &str, label: &str, col_type: &str) -> Self {
        Self {
            id: id.to_string(),
            fields: ColumnFields { label: label.to_string(), col_type: col_type.to_string(), display_col_id: None },
        }
    }

    pub fn with_display_col(mut self, display_col_id: &str) -> Self {
        self.fields.display_col_id = Some(display_col_id.to_string());
        self
    }

    pub fn type_tag(&self) -> &str { &self.fields.col_type }

    /// Type tag without its `:Zone` (or `:Table`) suffix.
    pub fn base_type(&self) -> &str {
        match self.fields.col_type.split_once(':') {
            Some((base, _)) => base,
            None => &self.fields.col_type,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.fields.col_type.starts_with(REFERENCE_TYPE_PREFIX)
    }

    /// Column whose values should be read for this one.
    pub fn source_col_id(&self) -> &str {
        self.fields.display_col_id.as_deref().unwrap_or(&self.id)
    }
}

/// Body of `GET tables/{tableId}/columns`.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnsResponse {
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}
