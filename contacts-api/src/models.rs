use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ===== Environment Models =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

// ===== Contact Models (scoped by environment_id) =====

/// Schema entry for one attribute a contact may carry, unique per environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttributeKey {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub key: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactAttribute {
    pub attribute_key_id: Uuid,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attributes: Vec<ContactAttribute>,
}

impl Contact {
    /// Value stored under `key`, if the contact carries that attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.key == key)
            .map(|attribute| attribute.value.as_str())
    }

    /// Attributes flattened to `key -> value`.
    pub fn attribute_map(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .map(|attribute| (attribute.key.clone(), attribute.value.clone()))
            .collect()
    }
}

// ===== Row Types =====

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ContactRow {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ContactAttributeRow {
    pub contact_id: Uuid,
    pub attribute_key_id: Uuid,
    pub key: String,
    pub value: String,
}

// ===== Response Envelopes =====

/// Envelope wrapping every successful JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub size: i64,
}

/// Envelope for paginated list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub page: PageMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: i64, size: i64) -> Self {
        Self {
            data,
            page: PageMeta { page, size },
        }
    }
}
