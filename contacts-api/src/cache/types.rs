use std::fmt;
use uuid::Uuid;

/// Entity whose cached reads must be dropped once it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// Anything listing or aggregating contacts of an environment.
    Environment(Uuid),
    /// Reads of a single contact.
    Contact(Uuid),
    /// The attribute-key schema of an environment.
    AttributeKeys(Uuid),
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTag::Environment(id) => write!(f, "environments-{id}"),
            CacheTag::Contact(id) => write!(f, "contacts-{id}"),
            CacheTag::AttributeKeys(id) => write!(f, "environments-{id}-attribute-keys"),
        }
    }
}

/// Receiver of "these entities changed" signals emitted after writes.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, tags: &[CacheTag]);
}

/// Invalidator for callers that keep no cache (the CLI, some tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, _tags: &[CacheTag]) {}
}
