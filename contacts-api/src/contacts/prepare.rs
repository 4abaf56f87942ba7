//! Batch validation and record preparation.
//!
//! Turns caller-supplied rows into [`MappedRecord`]s keyed by attribute key
//! name and extracts the sets the importer looks up in bulk. Nothing here
//! touches the store.

use super::error::ValidationError;
use super::types::{AttributeMap, ImportRecord, MappedRecord, NewAttributeKey};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Reject batches that are empty, oversized or carry a malformed attribute map.
pub(crate) fn validate_batch(
    records: &[ImportRecord],
    attribute_map: &AttributeMap,
    max_records: usize,
) -> Result<(), ValidationError> {
    if records.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    if records.len() > max_records {
        return Err(ValidationError::TooManyRecords {
            count: records.len(),
            max: max_records,
        });
    }

    let mut targets: HashMap<&str, &str> = HashMap::new();
    for (column, key) in attribute_map {
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyAttributeKey {
                column: column.clone(),
            });
        }
        if let Some(first) = targets.insert(key.as_str(), column.as_str()) {
            return Err(ValidationError::ConflictingAttributeMapping {
                key: key.clone(),
                first: first.to_string(),
                second: column.clone(),
            });
        }
    }

    for (row, record) in records.iter().enumerate() {
        if record.keys().any(|column| column.trim().is_empty()) {
            return Err(ValidationError::EmptyColumnName { row });
        }
    }

    Ok(())
}

/// Rename columns to attribute keys. Unmapped columns keep their own name.
pub(crate) fn map_records(
    records: Vec<ImportRecord>,
    attribute_map: &AttributeMap,
) -> Result<Vec<MappedRecord>, ValidationError> {
    let mut mapped = Vec::with_capacity(records.len());

    for (row, record) in records.into_iter().enumerate() {
        let mut attributes = BTreeMap::new();
        let mut names: BTreeMap<String, String> = BTreeMap::new();

        for (column, value) in record {
            let key = attribute_map
                .get(&column)
                .cloned()
                .unwrap_or_else(|| column.clone());

            if let Some(first) = names.get(&key) {
                return Err(ValidationError::ConflictingAttributeMapping {
                    key,
                    first: first.clone(),
                    second: column,
                });
            }
            names.insert(key.clone(), column);
            attributes.insert(key, value);
        }

        mapped.push(MappedRecord {
            row,
            attributes,
            names,
        });
    }

    Ok(mapped)
}

/// Distinct non-empty values in order of first appearance.
pub(crate) fn distinct_values<'a, F>(records: &'a [MappedRecord], extract: F) -> Vec<String>
where
    F: Fn(&'a MappedRecord) -> Option<&'a str>,
{
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(extract)
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

/// A batch may not mention the same email or userId twice.
pub(crate) fn reject_in_batch_duplicates(records: &[MappedRecord]) -> Result<(), ValidationError> {
    let mut emails = HashSet::new();
    let mut user_ids = HashSet::new();

    for record in records {
        if let Some(email) = record.email() {
            if !emails.insert(email) {
                return Err(ValidationError::DuplicateEmail(email.to_string()));
            }
        }
        if let Some(user_id) = record.user_id() {
            if !user_ids.insert(user_id) {
                return Err(ValidationError::DuplicateUserId(user_id.to_string()));
            }
        }
    }

    Ok(())
}

/// Keys referenced by any record but absent from `existing`, in order of
/// first appearance, each named after the column it came from.
pub(crate) fn missing_attribute_keys(
    records: &[MappedRecord],
    existing: &HashSet<String>,
) -> Vec<NewAttributeKey> {
    let mut seen = HashSet::new();
    let mut missing = Vec::new();

    for record in records {
        for (key, column) in &record.names {
            if existing.contains(key) || !seen.insert(key.as_str()) {
                continue;
            }
            missing.push(NewAttributeKey {
                key: key.clone(),
                name: column.clone(),
            });
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> ImportRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        let map = AttributeMap::new();
        assert_eq!(
            validate_batch(&[], &map, 10),
            Err(ValidationError::EmptyBatch)
        );

        let records = vec![record(&[("email", "a@x.com")]); 3];
        assert_eq!(
            validate_batch(&records, &map, 2),
            Err(ValidationError::TooManyRecords { count: 3, max: 2 })
        );
    }

    #[test]
    fn rejects_two_columns_mapped_to_one_key() {
        let map: AttributeMap = [
            ("E-mail".to_string(), "email".to_string()),
            ("Mail".to_string(), "email".to_string()),
        ]
        .into_iter()
        .collect();

        let err = validate_batch(&[record(&[("E-mail", "a@x.com")])], &map, 10).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ConflictingAttributeMapping { ref key, .. } if key == "email"
        ));
    }

    #[test]
    fn rejects_blank_column_names() {
        let records = vec![record(&[("email", "a@x.com")]), record(&[(" ", "x")])];
        assert_eq!(
            validate_batch(&records, &AttributeMap::new(), 10),
            Err(ValidationError::EmptyColumnName { row: 1 })
        );
    }

    #[test]
    fn mapping_renames_columns_and_keeps_headers_as_names() {
        let map: AttributeMap = [("E-mail".to_string(), "email".to_string())]
            .into_iter()
            .collect();
        let mapped = map_records(vec![record(&[("E-mail", "a@x.com"), ("plan", "free")])], &map)
            .unwrap();

        assert_eq!(mapped[0].email(), Some("a@x.com"));
        assert_eq!(mapped[0].names.get("email").map(String::as_str), Some("E-mail"));
        assert_eq!(mapped[0].names.get("plan").map(String::as_str), Some("plan"));
    }

    #[test]
    fn mapping_rejects_column_colliding_with_mapped_key() {
        let map: AttributeMap = [("E-mail".to_string(), "email".to_string())]
            .into_iter()
            .collect();
        let err = map_records(
            vec![record(&[("E-mail", "a@x.com"), ("email", "b@x.com")])],
            &map,
        )
        .unwrap_err();

        assert!(matches!(err, ValidationError::ConflictingAttributeMapping { .. }));
    }

    #[test]
    fn distinct_values_skip_missing_and_empty() {
        let mapped = map_records(
            vec![
                record(&[("email", "b@x.com")]),
                record(&[("email", "")]),
                record(&[("userId", "u1")]),
                record(&[("email", "a@x.com")]),
            ],
            &AttributeMap::new(),
        )
        .unwrap();

        let emails = distinct_values(&mapped, MappedRecord::email);
        assert_eq!(emails, vec!["b@x.com".to_string(), "a@x.com".to_string()]);
    }

    #[test]
    fn duplicate_emails_in_batch_are_rejected() {
        let mapped = map_records(
            vec![record(&[("email", "a@x.com")]), record(&[("email", "a@x.com")])],
            &AttributeMap::new(),
        )
        .unwrap();

        assert_eq!(
            reject_in_batch_duplicates(&mapped),
            Err(ValidationError::DuplicateEmail("a@x.com".to_string()))
        );
    }

    #[test]
    fn missing_keys_are_listed_once() {
        let mapped = map_records(
            vec![
                record(&[("email", "a@x.com"), ("plan", "free")]),
                record(&[("email", "b@x.com"), ("plan", "pro"), ("city", "NYC")]),
            ],
            &AttributeMap::new(),
        )
        .unwrap();
        let existing: HashSet<String> = ["email".to_string()].into_iter().collect();

        let missing: Vec<String> = missing_attribute_keys(&mapped, &existing)
            .into_iter()
            .map(|k| k.key)
            .collect();
        assert_eq!(missing, vec!["plan".to_string(), "city".to_string()]);
    }
}
