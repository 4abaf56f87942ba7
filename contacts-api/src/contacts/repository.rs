//! Storage seam for contacts and their attribute keys.
//!
//! The importer and the HTTP handlers only talk to this trait, so the same
//! pipeline runs against PostgreSQL in production and against the in-memory
//! store in tests.

use super::error::StoreError;
use super::types::{AttributeValue, NewAttributeKey};
use crate::models::{AttributeKey, Contact};
use uuid::Uuid;

#[rocket::async_trait]
pub trait ContactRepository: Send + Sync {
    async fn environment_exists(&self, environment_id: Uuid) -> Result<bool, StoreError>;

    /// Contacts in `environment_id` whose `key` attribute holds one of `values`,
    /// each returned with its full attribute set.
    async fn find_by_attribute_value_in(
        &self,
        environment_id: Uuid,
        key: &str,
        values: &[String],
    ) -> Result<Vec<Contact>, StoreError>;

    async fn list_attribute_keys(&self, environment_id: Uuid)
    -> Result<Vec<AttributeKey>, StoreError>;

    /// Create the given keys, silently skipping any that already exist.
    ///
    /// Returns the number of keys actually inserted.
    async fn create_attribute_keys(
        &self,
        environment_id: Uuid,
        keys: &[NewAttributeKey],
    ) -> Result<usize, StoreError>;

    async fn create_contact(
        &self,
        environment_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError>;

    /// Overwrite the value of attributes the contact already has and add the
    /// rest. Attributes not mentioned are left untouched.
    async fn upsert_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError>;

    /// Drop every attribute of the contact and write exactly `attributes`.
    async fn replace_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError>;

    async fn get_contact(&self, contact_id: Uuid) -> Result<Option<Contact>, StoreError>;

    /// Contacts of an environment, newest first.
    async fn list_contacts(
        &self,
        environment_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, StoreError>;

    /// Returns `false` when no such contact existed.
    async fn delete_contact(&self, contact_id: Uuid) -> Result<bool, StoreError>;
}
