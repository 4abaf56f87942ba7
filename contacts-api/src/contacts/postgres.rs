//! PostgreSQL implementation of [`ContactRepository`].
//!
//! Bulk writes use `UNNEST` so a record's attributes land in a single
//! statement. Every contact-level write runs in its own transaction; the
//! `UPDATE contacts ... RETURNING` at the start of an update also takes the
//! row lock that serializes concurrent writers to the same contact.

use super::error::StoreError;
use super::repository::ContactRepository;
use super::types::{AttributeValue, NewAttributeKey};
use crate::models::{
    AttributeKey, Contact, ContactAttribute, ContactAttributeRow, ContactRow, Environment,
};
use rocket_db_pools::sqlx::{self, PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

/// What to do when an attribute row for the same (contact, key) already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    Fail,
    Overwrite,
}

#[derive(Clone)]
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a fresh environment row. Used by the CLI and integration tests.
    pub async fn create_environment(&self) -> Result<Environment, StoreError> {
        let environment = sqlx::query_as::<_, Environment>(
            "INSERT INTO environments DEFAULT VALUES RETURNING id, created_at",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(environment)
    }

    /// Attach attribute rows to each contact row.
    async fn hydrate(&self, rows: Vec<ContactRow>) -> Result<Vec<Contact>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();

        let attribute_rows = sqlx::query_as::<_, ContactAttributeRow>(
            r#"SELECT ca.contact_id, ca.attribute_key_id, k.key, ca.value
               FROM contact_attributes ca
               JOIN contact_attribute_keys k ON k.id = ca.attribute_key_id
               WHERE ca.contact_id = ANY($1)
               ORDER BY k.key"#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_contact: HashMap<Uuid, Vec<ContactAttribute>> = HashMap::new();
        for row in attribute_rows {
            by_contact
                .entry(row.contact_id)
                .or_default()
                .push(ContactAttribute {
                    attribute_key_id: row.attribute_key_id,
                    key: row.key,
                    value: row.value,
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| Contact {
                attributes: by_contact.remove(&row.id).unwrap_or_default(),
                id: row.id,
                environment_id: row.environment_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn load_contact(&self, contact_id: Uuid) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query_as::<_, ContactRow>(
            "SELECT id, environment_id, created_at, updated_at FROM contacts WHERE id = $1",
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn load_written_contact(&self, contact_id: Uuid) -> Result<Contact, StoreError> {
        self.load_contact(contact_id)
            .await?
            .ok_or(StoreError::ContactNotFound(contact_id))
    }
}

/// Bump `updated_at`, locking the contact row for the rest of the transaction.
async fn touch_contact(conn: &mut PgConnection, contact_id: Uuid) -> Result<(), StoreError> {
    let touched: Option<Uuid> =
        sqlx::query_scalar("UPDATE contacts SET updated_at = NOW() WHERE id = $1 RETURNING id")
            .bind(contact_id)
            .fetch_optional(&mut *conn)
            .await?;

    touched
        .map(|_| ())
        .ok_or(StoreError::ContactNotFound(contact_id))
}

/// Write a batch of attribute rows for one contact.
///
/// Returns the number of rows inserted or updated.
async fn insert_attributes(
    conn: &mut PgConnection,
    contact_id: Uuid,
    attributes: &[AttributeValue],
    on_conflict: OnConflict,
) -> Result<u64, sqlx::Error> {
    if attributes.is_empty() {
        return Ok(0);
    }

    let key_ids: Vec<Uuid> = attributes.iter().map(|a| a.attribute_key_id).collect();
    let values: Vec<String> = attributes.iter().map(|a| a.value.clone()).collect();

    let statement = match on_conflict {
        OnConflict::Fail => {
            r#"INSERT INTO contact_attributes (contact_id, attribute_key_id, value)
               SELECT $1, key_id, value
               FROM UNNEST($2::uuid[], $3::text[]) AS t(key_id, value)"#
        }
        OnConflict::Overwrite => {
            r#"INSERT INTO contact_attributes (contact_id, attribute_key_id, value)
               SELECT $1, key_id, value
               FROM UNNEST($2::uuid[], $3::text[]) AS t(key_id, value)
               ON CONFLICT (contact_id, attribute_key_id) DO UPDATE
               SET value = EXCLUDED.value,
                   updated_at = NOW()"#
        }
    };

    let result = sqlx::query(statement)
        .bind(contact_id)
        .bind(&key_ids)
        .bind(&values)
        .execute(&mut *conn)
        .await?;

    log::trace!(
        "wrote {} attributes for contact {}",
        result.rows_affected(),
        contact_id
    );
    Ok(result.rows_affected())
}

#[rocket::async_trait]
impl ContactRepository for PgContactRepository {
    async fn environment_exists(&self, environment_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM environments WHERE id = $1)")
                .bind(environment_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn find_by_attribute_value_in(
        &self,
        environment_id: Uuid,
        key: &str,
        values: &[String],
    ) -> Result<Vec<Contact>, StoreError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ContactRow>(
            r#"SELECT c.id, c.environment_id, c.created_at, c.updated_at
               FROM contacts c
               WHERE c.environment_id = $1
                 AND EXISTS (
                     SELECT 1
                     FROM contact_attributes ca
                     JOIN contact_attribute_keys k ON k.id = ca.attribute_key_id
                     WHERE ca.contact_id = c.id
                       AND k.key = $2
                       AND ca.value = ANY($3)
                 )"#,
        )
        .bind(environment_id)
        .bind(key)
        .bind(values)
        .fetch_all(&self.pool)
        .await?;

        log::debug!(
            "matched {} contacts on {} ({} candidate values)",
            rows.len(),
            key,
            values.len()
        );
        self.hydrate(rows).await
    }

    async fn list_attribute_keys(
        &self,
        environment_id: Uuid,
    ) -> Result<Vec<AttributeKey>, StoreError> {
        let keys = sqlx::query_as::<_, AttributeKey>(
            r#"SELECT id, environment_id, key, name, created_at
               FROM contact_attribute_keys
               WHERE environment_id = $1
               ORDER BY created_at, key"#,
        )
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn create_attribute_keys(
        &self,
        environment_id: Uuid,
        keys: &[NewAttributeKey],
    ) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let names: Vec<String> = keys.iter().map(|k| k.key.clone()).collect();
        let display_names: Vec<String> = keys.iter().map(|k| k.name.clone()).collect();

        let result = sqlx::query(
            r#"INSERT INTO contact_attribute_keys (environment_id, key, name)
               SELECT $1, key, name
               FROM UNNEST($2::text[], $3::text[]) AS t(key, name)
               ON CONFLICT (environment_id, key) DO NOTHING"#,
        )
        .bind(environment_id)
        .bind(&names)
        .bind(&display_names)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() as usize;
        if inserted < keys.len() {
            log::debug!(
                "create_attribute_keys: tried to insert {} keys, {} already existed",
                keys.len(),
                keys.len() - inserted
            );
        }

        Ok(inserted)
    }

    async fn create_contact(
        &self,
        environment_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError> {
        let mut tx = self.pool.begin().await?;

        let contact_id: Uuid =
            sqlx::query_scalar("INSERT INTO contacts (environment_id) VALUES ($1) RETURNING id")
                .bind(environment_id)
                .fetch_one(&mut *tx)
                .await?;

        insert_attributes(&mut tx, contact_id, attributes, OnConflict::Fail).await?;
        tx.commit().await?;

        self.load_written_contact(contact_id).await
    }

    async fn upsert_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError> {
        let mut tx = self.pool.begin().await?;

        touch_contact(&mut tx, contact_id).await?;
        insert_attributes(&mut tx, contact_id, attributes, OnConflict::Overwrite).await?;
        tx.commit().await?;

        self.load_written_contact(contact_id).await
    }

    async fn replace_attributes(
        &self,
        contact_id: Uuid,
        attributes: &[AttributeValue],
    ) -> Result<Contact, StoreError> {
        let mut tx = self.pool.begin().await?;

        touch_contact(&mut tx, contact_id).await?;
        sqlx::query("DELETE FROM contact_attributes WHERE contact_id = $1")
            .bind(contact_id)
            .execute(&mut *tx)
            .await?;
        insert_attributes(&mut tx, contact_id, attributes, OnConflict::Fail).await?;
        tx.commit().await?;

        self.load_written_contact(contact_id).await
    }

    async fn get_contact(&self, contact_id: Uuid) -> Result<Option<Contact>, StoreError> {
        self.load_contact(contact_id).await
    }

    async fn list_contacts(
        &self,
        environment_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Contact>, StoreError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"SELECT id, environment_id, created_at, updated_at
               FROM contacts
               WHERE environment_id = $1
               ORDER BY created_at DESC, id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(environment_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn delete_contact(&self, contact_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(contact_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
