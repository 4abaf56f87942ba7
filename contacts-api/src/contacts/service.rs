//! Contact operations behind the HTTP handlers.
//!
//! Bundles the repository, the read cache and the importer so handlers only
//! need one piece of managed state.

use super::error::{ImportResult, StoreError};
use super::importer::ContactImporter;
use super::repository::ContactRepository;
use super::stats::ImportReport;
use super::types::{AttributeMap, DuplicateAction, ImportRecord};
use crate::cache::{CacheInvalidator, CacheTag, ContactReadCache};
use crate::config::ContactsConfig;
use crate::models::{AttributeKey, Contact};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("environment {0} not found")]
    EnvironmentNotFound(Uuid),
    #[error("contact {0} not found")]
    ContactNotFound(Uuid),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub struct ContactService {
    repository: Arc<dyn ContactRepository>,
    cache: Arc<ContactReadCache>,
    importer: ContactImporter,
}

impl ContactService {
    pub fn new(repository: Arc<dyn ContactRepository>, config: &ContactsConfig) -> Self {
        let cache = Arc::new(ContactReadCache::new(config.cache_ttl));
        let invalidator: Arc<dyn CacheInvalidator> = cache.clone();
        let importer = ContactImporter::new(repository.clone(), invalidator, config);

        Self {
            repository,
            cache,
            importer,
        }
    }

    pub fn importer(&self) -> &ContactImporter {
        &self.importer
    }

    pub async fn ensure_environment(&self, environment_id: Uuid) -> Result<(), LookupError> {
        if self.repository.environment_exists(environment_id).await? {
            Ok(())
        } else {
            Err(LookupError::EnvironmentNotFound(environment_id))
        }
    }

    /// Import into an environment that is known to exist.
    pub async fn import(
        &self,
        environment_id: Uuid,
        records: Vec<ImportRecord>,
        action: DuplicateAction,
        attribute_map: &AttributeMap,
    ) -> ImportResult<ImportReport> {
        self.importer
            .import(records, environment_id, action, attribute_map)
            .await
    }

    pub async fn list_contacts(
        &self,
        environment_id: Uuid,
        page: i64,
        size: i64,
    ) -> Result<Vec<Contact>, LookupError> {
        self.ensure_environment(environment_id).await?;

        let offset = page.max(1).saturating_sub(1).saturating_mul(size.max(0));
        self.cache
            .contact_page(environment_id, page, size, || async {
                self.repository
                    .list_contacts(environment_id, size, offset)
                    .await
                    .map_err(LookupError::from)
            })
            .await
    }

    pub async fn get_contact(&self, contact_id: Uuid) -> Result<Contact, LookupError> {
        self.cache
            .contact(contact_id, || async {
                self.repository
                    .get_contact(contact_id)
                    .await?
                    .ok_or(LookupError::ContactNotFound(contact_id))
            })
            .await
    }

    pub async fn delete_contact(&self, contact_id: Uuid) -> Result<(), LookupError> {
        let contact = self
            .repository
            .get_contact(contact_id)
            .await?
            .ok_or(LookupError::ContactNotFound(contact_id))?;

        if !self.repository.delete_contact(contact_id).await? {
            return Err(LookupError::ContactNotFound(contact_id));
        }

        self.cache.invalidate(&[
            CacheTag::Contact(contact_id),
            CacheTag::Environment(contact.environment_id),
        ]);
        log::info!(
            "deleted contact {} from environment {}",
            contact_id,
            contact.environment_id
        );
        Ok(())
    }

    pub async fn list_attribute_keys(
        &self,
        environment_id: Uuid,
    ) -> Result<Vec<AttributeKey>, LookupError> {
        self.ensure_environment(environment_id).await?;

        self.cache
            .attribute_keys(environment_id, || async {
                self.repository
                    .list_attribute_keys(environment_id)
                    .await
                    .map_err(LookupError::from)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::InMemoryContactRepository;

    #[tokio::test]
    async fn cached_reads_refresh_after_import() {
        let repo = Arc::new(InMemoryContactRepository::new());
        let env = repo.create_environment();
        let service = ContactService::new(repo.clone(), &ContactsConfig::default());

        assert!(service.list_contacts(env.id, 1, 50).await.unwrap().is_empty());

        let record: ImportRecord = [("email".to_string(), "a@x.com".to_string())]
            .into_iter()
            .collect();
        service
            .import(env.id, vec![record], DuplicateAction::Update, &AttributeMap::new())
            .await
            .unwrap();

        assert_eq!(service.list_contacts(env.id, 1, 50).await.unwrap().len(), 1);
        assert_eq!(service.list_attribute_keys(env.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_environment_and_contact_are_not_found() {
        let repo = Arc::new(InMemoryContactRepository::new());
        let service = ContactService::new(repo, &ContactsConfig::default());

        assert!(matches!(
            service.list_contacts(Uuid::new_v4(), 1, 50).await,
            Err(LookupError::EnvironmentNotFound(_))
        ));
        assert!(matches!(
            service.get_contact(Uuid::new_v4()).await,
            Err(LookupError::ContactNotFound(_))
        ));
        assert!(matches!(
            service.delete_contact(Uuid::new_v4()).await,
            Err(LookupError::ContactNotFound(_))
        ));
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let repo = Arc::new(InMemoryContactRepository::new());
        let env = repo.create_environment();
        let service = ContactService::new(repo, &ContactsConfig::default());
        let record: ImportRecord = [("email".to_string(), "a@x.com".to_string())]
            .into_iter()
            .collect();
        service
            .import(env.id, vec![record], DuplicateAction::Update, &AttributeMap::new())
            .await
            .unwrap();

        let page = service.list_contacts(env.id, i64::MAX, 100).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn delete_evicts_cached_contact() {
        let repo = Arc::new(InMemoryContactRepository::new());
        let env = repo.create_environment();
        let service = ContactService::new(repo.clone(), &ContactsConfig::default());
        let record: ImportRecord = [("email".to_string(), "a@x.com".to_string())]
            .into_iter()
            .collect();
        let report = service
            .import(env.id, vec![record], DuplicateAction::Update, &AttributeMap::new())
            .await
            .unwrap();
        let contact_id = report.contacts[0].id;

        assert_eq!(service.get_contact(contact_id).await.unwrap().id, contact_id);
        service.delete_contact(contact_id).await.unwrap();

        assert!(matches!(
            service.get_contact(contact_id).await,
            Err(LookupError::ContactNotFound(_))
        ));
        assert_eq!(repo.contact_count(env.id), 0);
    }
}
