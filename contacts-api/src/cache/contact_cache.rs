use super::tag_cache::TagCache;
use super::types::{CacheInvalidator, CacheTag};
use crate::models::{AttributeKey, Contact};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Typed read caches behind the contact endpoints.
pub struct ContactReadCache {
    ttl: Duration,
    contact_pages: TagCache<Vec<Contact>>,
    contacts: TagCache<Contact>,
    attribute_keys: TagCache<Vec<AttributeKey>>,
}

impl ContactReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            contact_pages: TagCache::new(),
            contacts: TagCache::new(),
            attribute_keys: TagCache::new(),
        }
    }

    pub async fn contact_page<F, Fut, E>(
        &self,
        environment_id: Uuid,
        page: i64,
        size: i64,
        compute: F,
    ) -> Result<Vec<Contact>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Contact>, E>>,
    {
        let key = format!("contacts:{environment_id}:{page}:{size}");
        self.contact_pages
            .get_or_compute(&key, self.ttl, &[CacheTag::Environment(environment_id)], compute)
            .await
    }

    pub async fn contact<F, Fut, E>(&self, contact_id: Uuid, compute: F) -> Result<Contact, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Contact, E>>,
    {
        let key = format!("contact:{contact_id}");
        self.contacts
            .get_or_compute(&key, self.ttl, &[CacheTag::Contact(contact_id)], compute)
            .await
    }

    pub async fn attribute_keys<F, Fut, E>(
        &self,
        environment_id: Uuid,
        compute: F,
    ) -> Result<Vec<AttributeKey>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<AttributeKey>, E>>,
    {
        let key = format!("attribute-keys:{environment_id}");
        self.attribute_keys
            .get_or_compute(
                &key,
                self.ttl,
                &[CacheTag::AttributeKeys(environment_id)],
                compute,
            )
            .await
    }
}

impl CacheInvalidator for ContactReadCache {
    fn invalidate(&self, tags: &[CacheTag]) {
        let evicted = self.contact_pages.invalidate(tags)
            + self.contacts.invalidate(tags)
            + self.attribute_keys.invalidate(tags);

        if evicted > 0 {
            let names: Vec<String> = tags.iter().map(ToString::to_string).collect();
            log::debug!("evicted {} cached reads for [{}]", evicted, names.join(", "));
        }
    }
}
