//! Loading import records from JSON files.
//!
//! The file holds an array of flat objects, one per row. Strings are kept
//! verbatim, numbers and booleans are rendered as text, and `null` columns are
//! left out of the record.

use super::types::ImportRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordsFileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record {row}: column '{column}' must be a string, number or boolean")]
    UnsupportedValue { row: usize, column: String },
}

pub fn load_records(path: &Path) -> Result<Vec<ImportRecord>, RecordsFileError> {
    let data = std::fs::read(path)?;
    parse_records(&data)
}

pub fn parse_records(data: &[u8]) -> Result<Vec<ImportRecord>, RecordsFileError> {
    let rows: Vec<BTreeMap<String, Value>> = serde_json::from_slice(data)?;

    rows.into_iter()
        .enumerate()
        .map(|(row, columns)| {
            let mut record = ImportRecord::new();
            for (column, value) in columns {
                let text = match value {
                    Value::Null => continue,
                    Value::String(text) => text,
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    Value::Array(_) | Value::Object(_) => {
                        return Err(RecordsFileError::UnsupportedValue { row, column });
                    }
                };
                record.insert(column, text);
            }
            Ok(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scalars_become_strings_and_nulls_are_skipped() {
        let records =
            parse_records(br#"[{"email": "a@x.com", "seats": 3, "trial": false, "city": null}]"#)
                .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("seats").map(String::as_str), Some("3"));
        assert_eq!(records[0].get("trial").map(String::as_str), Some("false"));
        assert!(!records[0].contains_key("city"));
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = parse_records(br#"[{"email": "a@x.com"}, {"tags": ["a"]}]"#).unwrap_err();
        assert!(matches!(
            err,
            RecordsFileError::UnsupportedValue { row: 1, ref column } if column == "tags"
        ));
    }

    #[test]
    fn loads_records_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"email": "a@x.com", "plan": "free"}]"#)
            .unwrap();

        let records = load_records(file.path()).unwrap();
        assert_eq!(records[0].get("plan").map(String::as_str), Some("free"));
    }
}
