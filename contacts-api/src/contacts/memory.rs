//! In-memory [`ContactRepository`] used by tests and local tooling.
//!
//! Mirrors the PostgreSQL constraints the importer relies on: attribute keys
//! are unique per environment, each contact has at most one value per key, and
//! attribute writes must reference a key of the contact's environment.

use super::error::StoreError;
use super::repository::ContactRepository;
use super::types::{AttributeValue, NewAttributeKey};
use crate::models::{AttributeKey, Contact, ContactAttribute, Environment};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rocket_db_pools::sqlx;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

struct StoredContact {
    id: Uuid,
    environment_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// attribute_key_id -> value
    attributes: BTreeMap<Uuid, String>,
}

#[derive(Default)]
struct Tables {
    environments: HashMap<Uuid, Environment>,
    keys: Vec<AttributeKey>,
    contacts: HashMap<Uuid, StoredContact>,
}

impl Tables {
    fn key_by_id(&self, id: Uuid) -> Option<&AttributeKey> {
        self.keys.iter().find(|key| key.id == id)
    }

    fn render(&self, stored: &StoredContact) -> Contact {
        let mut attributes: Vec<ContactAttribute> = stored
            .attributes
            .iter()
            .filter_map(|(key_id, value)| {
                self.key_by_id(*key_id).map(|key| ContactAttribute {
                    attribute_key_id: *key_id,
                    key: key.key.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        attributes.sort_by(|a, b| a.key.cmp(&b.key));

        Contact {
            id: stored.id,
            environment_id: stored.environment_id,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            attributes,
        }
    }

    fn check_keys(
        &self,
        environment_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<(), StoreError> {
        for attribute in attributes {
            match self.key_by_id(attribute.attribute_key_id) {
                Some(key) if key.environment_id == environment_id => {}
                _ => {
                    return Err(StoreError::UnknownAttributeKey(
                        attribute.attribute_key_id.to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryContactRepository {
    tables: RwLock<Tables>,
    writes: AtomicUsize,
    failing_value: RwLock<Option<String>>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_environment(&self) -> Environment {
        let environment = Environment {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .environments
            .insert(environment.id, environment.clone());
        environment
    }

    /// Number of successful mutations performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contact_count(&self, environment_id: Uuid) -> usize {
        self.tables
            .read()
            .contacts
            .values()
            .filter(|contact| contact.environment_id == environment_id)
            .count()
    }

    /// Make every contact write carrying `value` in any attribute fail with a
    /// pool timeout, as a flaky database would.
    pub fn fail_writes_containing(&self, value: impl Into<String>) {
        *self.failing_value.write() = Some(value.into());
    }

    fn check_injected_failure(&self, attributes: &[AttributeValue]) -> Result<(), StoreError> {
        let failing = self.failing_value.read();
        match failing.as_deref() {
            Some(needle) if attributes.iter().any(|a| a.value == needle) => {
                Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            }
            _ => Ok(()),
        }
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn write_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
        replace: bool,
    ) -> Result<Contact, StoreError> {
        self.check_injected_failure(attributes)?;

        let mut tables = self.tables.write();
        let environment_id = tables
            .contacts
            .get(&contact_id)
            .map(|contact| contact.environment_id)
            .ok_or(StoreError::ContactNotFound(contact_id))?;
        tables.check_keys(environment_id, attributes)?;

        let Some(stored) = tables.contacts.get_mut(&contact_id) else {
            return Err(StoreError::ContactNotFound(contact_id));
        };
        if replace {
            stored.attributes.clear();
        }
        for attribute in attributes {
            stored
                .attributes
                .insert(attribute.attribute_key_id, attribute.value.clone());
        }
        stored.updated_at = Utc::now();

        let contact = tables
            .contacts
            .get(&contact_id)
            .map(|stored| tables.render(stored))
            .ok_or(StoreError::ContactNotFound(contact_id))?;
        drop(tables);

        self.record_write();
        Ok(contact)
    }
}

#[rocket::async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn environment_exists(&self, environment_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.read().environments.contains_key(&environment_id))
    }

    async fn find_by_attribute_value_in(
        &self,
        environment_id: Uuid,
        key: &str,
        values: &[String],
    ) -> Result<Vec<Contact>, StoreError> {
        let tables = self.tables.read();
        let Some(key_id) = tables
            .keys
            .iter()
            .find(|k| k.environment_id == environment_id && k.key == key)
            .map(|k| k.id)
        else {
            return Ok(Vec::new());
        };

        Ok(tables
            .contacts
            .values()
            .filter(|contact| contact.environment_id == environment_id)
            .filter(|contact| {
                contact
                    .attributes
                    .get(&key_id)
                    .is_some_and(|value| values.contains(value))
            })
            .map(|contact| tables.render(contact))
            .collect())
    }

    async fn list_attribute_keys(
        &self,
        environment_id: Uuid,
    ) -> Result<Vec<AttributeKey>, StoreError> {
        Ok(self
            .tables
            .read()
            .keys
            .iter()
            .filter(|key| key.environment_id == environment_id)
            .cloned()
            .collect())
    }

    async fn create_attribute_keys(
        &self,
        environment_id: Uuid,
        keys: &[NewAttributeKey],
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables.write();
        let mut inserted = 0;

        for new_key in keys {
            let exists = tables
                .keys
                .iter()
                .any(|k| k.environment_id == environment_id && k.key == new_key.key);
            if exists {
                continue;
            }
            tables.keys.push(AttributeKey {
                id: Uuid::new_v4(),
                environment_id,
                key: new_key.key.clone(),
                name: Some(new_key.name.clone()),
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        drop(tables);

        if inserted > 0 {
            self.record_write();
        }
        Ok(inserted)
    }

    async fn create_contact(
        &self,
        environment_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError> {
        self.check_injected_failure(attributes)?;

        let mut tables = self.tables.write();
        tables.check_keys(environment_id, attributes)?;

        let now = Utc::now();
        let stored = StoredContact {
            id: Uuid::new_v4(),
            environment_id,
            created_at: now,
            updated_at: now,
            attributes: attributes
                .iter()
                .map(|a| (a.attribute_key_id, a.value.clone()))
                .collect(),
        };
        let contact = tables.render(&stored);
        tables.contacts.insert(stored.id, stored);
        drop(tables);

        self.record_write();
        Ok(contact)
    }

    async fn upsert_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError> {
        self.write_attributes(contact_id, attributes, false)
    }

    async fn replace_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError> {
        self.write_attributes(contact_id, attributes, true)
    }

    async fn get_contact(&self, contact_id: Uuid) -> Result<Option<Contact>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .contacts
            .get(&contact_id)
            .map(|stored| tables.render(stored)))
    }

    async fn list_contacts(
        &self,
        environment_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, StoreError> {
        let tables = self.tables.read();
        let mut contacts: Vec<&StoredContact> = tables
            .contacts
            .values()
            .filter(|contact| contact.environment_id == environment_id)
            .collect();
        contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(contacts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|stored| tables.render(stored))
            .collect())
    }

    async fn delete_contact(&self, contact_id: Uuid) -> Result<bool, StoreError> {
        let removed = self.tables.write().contacts.remove(&contact_id).is_some();
        if removed {
            self.record_write();
        }
        Ok(removed)
    }
}
