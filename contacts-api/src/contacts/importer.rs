//! Import coordination for bulk contact uploads.
//!
//! The ContactImporter runs the whole pipeline for one batch:
//! 1. Validate and map the records, extract emails and userIds
//! 2. Load existing contacts by email
//! 3. Reject userIds that already belong to a contact
//! 4. Create missing attribute keys
//! 5. Resolve every record and write the results concurrently
//!
//! Steps 1-4 run strictly in sequence and nothing is written before step 4.
//! Step 5 writes each contact independently: a failing record is reported in
//! the [`ImportReport`] and does not stop the others.

use super::error::{ImportResult, StoreError, ValidationError};
use super::prepare;
use super::repository::ContactRepository;
use super::stats::{ImportReport, ImportStats, RecordFailure};
use super::types::{
    AttributeMap, AttributeValue, DuplicateAction, EMAIL_KEY, ImportRecord, MappedRecord,
    USER_ID_KEY,
};
use crate::cache::{CacheInvalidator, CacheTag};
use crate::config::ContactsConfig;
use crate::models::Contact;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// What happens to one record once existing state is known.
enum RecordPlan {
    /// No email: nothing written, nothing returned.
    Drop,
    /// Existing contact left untouched under [`DuplicateAction::Skip`].
    Skip { contact_id: Uuid },
    Write(WritePlan),
}

enum WritePlan {
    Create {
        attributes: Vec<AttributeValue>,
    },
    Update {
        contact_id: Uuid,
        attributes: Vec<AttributeValue>,
    },
    Overwrite {
        contact_id: Uuid,
        attributes: Vec<AttributeValue>,
    },
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Created,
    Updated,
    Overwritten,
}

impl WritePlan {
    fn kind(&self) -> WriteKind {
        match self {
            WritePlan::Create { .. } => WriteKind::Created,
            WritePlan::Update { .. } => WriteKind::Updated,
            WritePlan::Overwrite { .. } => WriteKind::Overwritten,
        }
    }

    async fn apply(
        self,
        repository: &dyn ContactRepository,
        environment_id: Uuid,
    ) -> Result<Contact, StoreError> {
        match self {
            WritePlan::Create { attributes } => {
                repository.create_contact(environment_id, &attributes).await
            }
            WritePlan::Update {
                contact_id,
                attributes,
            } => repository.upsert_attributes(contact_id, &attributes).await,
            WritePlan::Overwrite {
                contact_id,
                attributes,
            } => repository.replace_attributes(contact_id, &attributes).await,
        }
    }
}

/// Coordinates bulk contact imports for any [`ContactRepository`].
#[derive(Clone)]
pub struct ContactImporter {
    repository: Arc<dyn ContactRepository>,
    invalidator: Arc<dyn CacheInvalidator>,
    max_records: usize,
    concurrency: usize,
}

impl ContactImporter {
    pub fn new(
        repository: Arc<dyn ContactRepository>,
        invalidator: Arc<dyn CacheInvalidator>,
        config: &ContactsConfig,
    ) -> Self {
        Self {
            repository,
            invalidator,
            max_records: config.max_import_records,
            concurrency: config.import_concurrency.max(1),
        }
    }

    /// Import a batch of records into `environment_id`.
    ///
    /// # Errors
    /// - [`ImportError::Validation`](super::ImportError::Validation) for a
    ///   malformed batch or a userId that already exists; nothing is written
    /// - [`ImportError::Storage`](super::ImportError::Storage) when a lookup or
    ///   the attribute-key reconciliation fails
    ///
    /// Failures while writing individual contacts are collected in
    /// [`ImportReport::failures`] instead.
    pub async fn import(
        &self,
        records: Vec<ImportRecord>,
        environment_id: Uuid,
        action: DuplicateAction,
        attribute_map: &AttributeMap,
    ) -> ImportResult<ImportReport> {
        log::info!(
            "importing {} contact records into environment {} (duplicates: {})",
            records.len(),
            environment_id,
            action
        );

        // Phase 1: validate, map columns, extract dedup keys
        prepare::validate_batch(&records, attribute_map, self.max_records)?;
        let records = prepare::map_records(records, attribute_map)?;
        prepare::reject_in_batch_duplicates(&records)?;

        let emails = prepare::distinct_values(&records, MappedRecord::email);
        let user_ids = prepare::distinct_values(&records, MappedRecord::user_id);

        // Phase 2: existing contacts keyed by email
        let existing = self.load_existing_by_email(environment_id, &emails).await?;
        log::debug!(
            "{} of {} emails already belong to contacts",
            existing.len(),
            emails.len()
        );

        // Phase 3: userId collisions abort before any write
        self.reject_user_id_collisions(environment_id, &user_ids)
            .await?;

        // Phase 4: attribute-key schema
        let mut stats = ImportStats::default();
        let (key_ids, created_keys) = self
            .reconcile_attribute_keys(environment_id, &records)
            .await?;
        stats.attribute_keys_created = created_keys;

        // Phase 5: resolve and write
        let mut plans = Vec::with_capacity(records.len());
        for record in &records {
            let plan = plan_record(record, &existing, action, &key_ids)?;
            plans.push((record.row, record.email().unwrap_or_default().to_string(), plan));
        }

        let (contacts, failures) = self.dispatch(environment_id, plans, &mut stats).await;

        log::info!(
            "import into environment {} finished: {} created, {} updated, {} overwritten, {} skipped, {} dropped, {} failed",
            environment_id,
            stats.created,
            stats.updated,
            stats.overwritten,
            stats.skipped,
            stats.dropped,
            stats.failed
        );

        Ok(ImportReport {
            contacts,
            stats,
            failures,
        })
    }

    async fn load_existing_by_email(
        &self,
        environment_id: Uuid,
        emails: &[String],
    ) -> Result<HashMap<String, Contact>, StoreError> {
        if emails.is_empty() {
            return Ok(HashMap::new());
        }

        let contacts = self
            .repository
            .find_by_attribute_value_in(environment_id, EMAIL_KEY, emails)
            .await?;

        let mut by_email = HashMap::with_capacity(contacts.len());
        for contact in contacts {
            let Some(email) = contact.attribute(EMAIL_KEY).map(str::to_string) else {
                continue;
            };
            if let Some(previous) = by_email.get(&email).map(|c: &Contact| c.id) {
                log::warn!(
                    "email {} is shared by contacts {} and {}; keeping the first",
                    email,
                    previous,
                    contact.id
                );
                continue;
            }
            by_email.insert(email, contact);
        }

        Ok(by_email)
    }

    async fn reject_user_id_collisions(
        &self,
        environment_id: Uuid,
        user_ids: &[String],
    ) -> ImportResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }

        let holders = self
            .repository
            .find_by_attribute_value_in(environment_id, USER_ID_KEY, user_ids)
            .await?;
        let taken: HashSet<&str> = holders
            .iter()
            .filter_map(|contact| contact.attribute(USER_ID_KEY))
            .collect();

        match user_ids.iter().find(|id| taken.contains(id.as_str())) {
            Some(collision) => {
                log::debug!(
                    "rejecting import into environment {}: userId {} already exists",
                    environment_id,
                    collision
                );
                Err(ValidationError::UserIdExists(collision.clone()).into())
            }
            None => Ok(()),
        }
    }

    /// Make sure every key the batch references exists; returns the
    /// `key -> id` table and how many keys were created.
    async fn reconcile_attribute_keys(
        &self,
        environment_id: Uuid,
        records: &[MappedRecord],
    ) -> Result<(HashMap<String, Uuid>, usize), StoreError> {
        let current = self.repository.list_attribute_keys(environment_id).await?;
        let existing: HashSet<String> = current.iter().map(|key| key.key.clone()).collect();

        let missing = prepare::missing_attribute_keys(records, &existing);
        if missing.is_empty() {
            return Ok((current.into_iter().map(|k| (k.key, k.id)).collect(), 0));
        }

        let created = self
            .repository
            .create_attribute_keys(environment_id, &missing)
            .await?;
        log::debug!(
            "created {} of {} missing attribute keys in environment {}",
            created,
            missing.len(),
            environment_id
        );
        if created > 0 {
            self.invalidator
                .invalidate(&[CacheTag::AttributeKeys(environment_id)]);
        }

        let keys = self.repository.list_attribute_keys(environment_id).await?;
        Ok((keys.into_iter().map(|k| (k.key, k.id)).collect(), created))
    }

    /// Run every write plan as its own task and gather the outcomes in input
    /// order.
    async fn dispatch(
        &self,
        environment_id: Uuid,
        plans: Vec<(usize, String, RecordPlan)>,
        stats: &mut ImportStats,
    ) -> (Vec<Contact>, Vec<RecordFailure>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for (row, email, plan) in plans {
            let write = match plan {
                RecordPlan::Drop => {
                    stats.dropped += 1;
                    continue;
                }
                RecordPlan::Skip { contact_id } => {
                    log::trace!("row {}: skipping existing contact {}", row, contact_id);
                    stats.skipped += 1;
                    continue;
                }
                RecordPlan::Write(write) => write,
            };

            let kind = write.kind();
            let repository = Arc::clone(&self.repository);
            let invalidator = Arc::clone(&self.invalidator);
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let contact = write.apply(repository.as_ref(), environment_id).await?;
                invalidator.invalidate(&[
                    CacheTag::Contact(contact.id),
                    CacheTag::Environment(environment_id),
                ]);
                Ok::<Contact, StoreError>(contact)
            });
            handles.push((row, email, kind, handle));
        }

        let mut contacts = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();

        for (row, email, kind, handle) in handles {
            let message = match handle.await {
                Ok(Ok(contact)) => {
                    match kind {
                        WriteKind::Created => stats.created += 1,
                        WriteKind::Updated => stats.updated += 1,
                        WriteKind::Overwritten => stats.overwritten += 1,
                    }
                    contacts.push(contact);
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(join_err) => format!("write task aborted: {join_err}"),
            };

            log::warn!("row {} ({}): contact write failed: {}", row, email, message);
            stats.failed += 1;
            failures.push(RecordFailure {
                row,
                email,
                message,
            });
        }

        (contacts, failures)
    }
}

/// Decide what to do with one record. Fails only if a key the record uses
/// is still unknown after reconciliation.
fn plan_record(
    record: &MappedRecord,
    existing: &HashMap<String, Contact>,
    action: DuplicateAction,
    key_ids: &HashMap<String, Uuid>,
) -> Result<RecordPlan, StoreError> {
    let Some(email) = record.email() else {
        return Ok(RecordPlan::Drop);
    };

    let match_id = existing.get(email).map(|contact| contact.id);
    let attributes = record
        .attributes
        .iter()
        .map(|(key, value)| {
            key_ids
                .get(key)
                .map(|id| AttributeValue::new(*id, value.clone()))
                .ok_or_else(|| StoreError::UnknownAttributeKey(key.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let plan = match (match_id, action) {
        (None, _) => WritePlan::Create { attributes },
        (Some(contact_id), DuplicateAction::Skip) => return Ok(RecordPlan::Skip { contact_id }),
        (Some(contact_id), DuplicateAction::Update) => WritePlan::Update {
            contact_id,
            attributes,
        },
        (Some(contact_id), DuplicateAction::Overwrite) => WritePlan::Overwrite {
            contact_id,
            attributes,
        },
    };

    Ok(RecordPlan::Write(plan))
}
