//! Import statistics and per-batch reporting.

use crate::models::Contact;
use rocket_okapi::okapi::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

/// Counts for a single import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    /// Contacts created for previously unknown emails
    pub created: usize,
    /// Existing contacts whose attributes were upserted
    pub updated: usize,
    /// Existing contacts whose attributes were replaced
    pub overwritten: usize,
    /// Rows matching an existing contact under the `skip` action
    pub skipped: usize,
    /// Rows without an email
    pub dropped: usize,
    /// Rows whose write failed in the store
    pub failed: usize,
    /// Attribute keys created while reconciling the schema
    pub attribute_keys_created: usize,
}

impl ImportStats {
    /// Merge another ImportStats into this one by summing all counts.
    ///
    /// Used to combine statistics from multiple import batches.
    pub fn merge(&mut self, other: ImportStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.overwritten += other.overwritten;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.failed += other.failed;
        self.attribute_keys_created += other.attribute_keys_created;
    }

    /// Contacts written by the batch.
    pub fn affected(&self) -> usize {
        self.created + self.updated + self.overwritten
    }
}

/// A row whose write failed while the rest of the batch went ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    /// Index of the record in the submitted batch.
    pub row: usize,
    pub email: String,
    pub message: String,
}

/// Result of one import call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Every contact created, updated or overwritten, in input order.
    pub contacts: Vec<Contact>,
    pub stats: ImportStats,
    pub failures: Vec<RecordFailure>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_every_counter() {
        let mut total = ImportStats {
            created: 2,
            skipped: 1,
            ..Default::default()
        };
        total.merge(ImportStats {
            created: 1,
            updated: 3,
            overwritten: 1,
            dropped: 4,
            failed: 1,
            attribute_keys_created: 2,
            ..Default::default()
        });

        assert_eq!(total.created, 3);
        assert_eq!(total.updated, 3);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.dropped, 4);
        assert_eq!(total.failed, 1);
        assert_eq!(total.attribute_keys_created, 2);
        assert_eq!(total.affected(), 7);
    }
}
