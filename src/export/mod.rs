//! Turning Grist rows into the publish payload: cell flattening, reference
//! filtering, type-tag normalization and CSV serialization.

mod csv;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grist::ColumnDescriptor;

pub use self::csv::{build_csv, cell_text};

/// Leading element Grist puts in list-valued cells.
pub const LIST_MARKER: &str = "L";

/// Flatten a list cell to comma-joined text, dropping the list marker.
/// Scalars are returned unchanged.
pub fn sanitize_value(value: &Value) -> Value {
    let Value::Array(items) = value else { return value.clone() };
    let items = match items.first() {
        Some(Value::String(first)) if first == LIST_MARKER => &items[1..],
        _ => &items[..],
    };
    let joined = items.iter().map(cell_text).collect::<Vec<_>>().join(",");
    Value::String(joined)
}

/// Drop reference columns; they never leave the document.
pub fn filter_columns(columns: Vec<ColumnDescriptor>) -> Vec<ColumnDescriptor> {
    columns.into_iter().filter(|c| !c.is_reference()).collect()
}

/// One entry of the column manifest sent alongside the CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnManifestEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub col_type: String,
    pub is_index: bool,
    pub timezone: Option<String>,
}

/// Tag prefix of timezone-aware datetime columns, e.g. `DateTime:Europe/Paris`.
pub const DATETIME_TYPE_PREFIX: &str = "DateTime:";

/// Split `DateTime:Zone` type tags and flag the index column. Other tags,
/// `RefList:Table` included, are sent whole.
///
/// At most one entry is marked as index; none is when `index_column_id`
/// matches no column, which the caller must reject.
pub fn normalize_columns(columns: &[ColumnDescriptor], index_column_id: &str) -> Vec<ColumnManifestEntry> {
    columns
        .iter()
        .map(|c| {
            let (col_type, timezone) = match c.type_tag().strip_prefix(DATETIME_TYPE_PREFIX) {
                Some(zone) => ("DateTime".to_string(), Some(zone.to_string())),
                None => (c.type_tag().to_string(), None),
            };
            ColumnManifestEntry { id: c.id.clone(), col_type, is_index: c.id == index_column_id, timezone }
        })
        .collect()
}

pub fn index_count(manifest: &[ColumnManifestEntry]) -> usize {
    manifest.iter().filter(|e| e.is_index).count()
}
