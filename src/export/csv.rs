use csv_async::AsyncWriter;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::grist::{ColumnDescriptor, Row};

use super::sanitize_value;

/// Text form of a cell as it appears in the CSV.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) => match sanitize_value(value) {
            Value::String(s) => s,
            other => other.to_string(),
        },
        Value::Object(_) => value.to_string(),
    }
}

/// Serialize `rows` as CSV with one header line of column ids.
///
/// Reference columns are skipped. Columns follow `columns` order and rows
/// follow `rows` order; cells missing from a row are written empty.
pub async fn build_csv(columns: &[ColumnDescriptor], rows: &[Row]) -> AppResult<String> {
    let kept: Vec<&ColumnDescriptor> = columns.iter().filter(|c| !c.is_reference()).collect();
    let mut writer = AsyncWriter::from_writer(Vec::new());

    let header: Vec<&str> = kept.iter().map(|c| c.id.as_str()).collect();
    writer.write_record(&header).await?;
    for row in rows {
        let record: Vec<String> = kept
            .iter()
            .map(|c| row.get(&c.id).map(cell_text).unwrap_or_default())
            .collect();
        writer.write_record(&record).await?;
    }

    let bytes = writer.into_inner().await.map_err(|e| AppError::internal(format!("csv flush: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::internal(format!("csv output is not utf-8: {}", e)))
}
