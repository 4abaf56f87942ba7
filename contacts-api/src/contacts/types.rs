//! Input and write-payload types shared by the importer and the repositories.

use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Attribute key used to match incoming rows against existing contacts.
pub const EMAIL_KEY: &str = "email";

/// Attribute key whose values must stay unique within an environment.
pub const USER_ID_KEY: &str = "userId";

/// One parsed CSV row: column name to raw string value.
pub type ImportRecord = BTreeMap<String, String>;

/// Column name to attribute key name, supplied alongside an import.
pub type AttributeMap = BTreeMap<String, String>;

/// How to treat a row whose email already belongs to a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateAction {
    /// Leave the existing contact untouched.
    Skip,
    /// Upsert the row's attributes onto the existing contact.
    Update,
    /// Replace every attribute of the existing contact with the row's.
    Overwrite,
}

impl DuplicateAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateAction::Skip => "skip",
            DuplicateAction::Update => "update",
            DuplicateAction::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for DuplicateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(DuplicateAction::Skip),
            "update" => Ok(DuplicateAction::Update),
            "overwrite" => Ok(DuplicateAction::Overwrite),
            other => Err(format!(
                "unsupported duplicate action '{other}'; expected skip, update or overwrite"
            )),
        }
    }
}

/// Attribute key that must exist before attribute rows referencing it are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttributeKey {
    pub key: String,
    /// Display name; the originating column header.
    pub name: String,
}

/// Attribute write payload with the key already resolved to its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    pub attribute_key_id: Uuid,
    pub value: String,
}

impl AttributeValue {
    pub fn new(attribute_key_id: Uuid, value: impl Into<String>) -> Self {
        Self {
            attribute_key_id,
            value: value.into(),
        }
    }
}

/// Record after the attribute map has been applied.
///
/// `attributes` is keyed by attribute key name; `names` keeps the column header
/// each key came from so auto-created keys get a readable display name.
#[derive(Debug, Clone, Default)]
pub(crate) struct MappedRecord {
    pub row: usize,
    pub attributes: BTreeMap<String, String>,
    pub names: BTreeMap<String, String>,
}

impl MappedRecord {
    fn non_empty(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.non_empty(EMAIL_KEY)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.non_empty(USER_ID_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_action_parses_case_insensitively() {
        assert_eq!("Skip".parse::<DuplicateAction>(), Ok(DuplicateAction::Skip));
        assert_eq!(
            " overwrite ".parse::<DuplicateAction>(),
            Ok(DuplicateAction::Overwrite)
        );
        assert!("merge".parse::<DuplicateAction>().is_err());
    }

    #[test]
    fn duplicate_action_serializes_lowercase() {
        let json = serde_json::to_string(&DuplicateAction::Update).unwrap();
        assert_eq!(json, "\"update\"");
        let parsed: DuplicateAction = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(parsed, DuplicateAction::Skip);
    }

    #[test]
    fn empty_email_counts_as_missing() {
        let mut record = MappedRecord::default();
        record.attributes.insert(EMAIL_KEY.to_string(), String::new());
        record.attributes.insert(USER_ID_KEY.to_string(), "u1".to_string());
        assert_eq!(record.email(), None);
        assert_eq!(record.user_id(), Some("u1"));
    }
}
