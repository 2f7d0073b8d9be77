//! Dataset records handed to task bodies.

use serde_json::Value;

use super::errors::DatasetError;

/// One flat, string-keyed record.
pub type Record = serde_json::Map<String, Value>;

/// Decode a dataset from a JSON array.
///
/// Non-object entries are dropped; they cannot contribute to any field.
/// A top-level value that is not an array is rejected.
pub fn records_from_json(value: Value) -> Result<Vec<Record>, DatasetError> {
    let Value::Array(items) = value else {
        return Err(DatasetError::Malformed(
            "expected a JSON array of records".to_string(),
        ));
    };

    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect();

    if records.len() < total {
        tracing::warn!(
            skipped = total - records.len(),
            total,
            "dropping non-object dataset entries"
        );
    }
    Ok(records)
}
