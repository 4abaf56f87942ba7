use std::env;
use std::time::Duration;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

/// Runtime configuration for contact import and the read cache.
#[derive(Debug, Clone)]
pub struct ContactsConfig {
    /// Largest batch a single import call accepts.
    pub max_import_records: usize,
    /// Upper bound on concurrent per-record writes during an import.
    pub import_concurrency: usize,
    /// Lifetime of cached contact and attribute-key reads.
    pub cache_ttl: Duration,
}

impl ContactsConfig {
    pub const DEFAULT_MAX_IMPORT_RECORDS: usize = 10_000;
    pub const DEFAULT_IMPORT_CONCURRENCY: usize = 16;
    pub const DEFAULT_CACHE_TTL_MS: u64 = 60_000;

    pub fn from_env() -> Self {
        Self {
            max_import_records: env_usize(
                "CONTACTS_IMPORT_MAX_RECORDS",
                Self::DEFAULT_MAX_IMPORT_RECORDS,
            ),
            import_concurrency: env_usize(
                "CONTACTS_IMPORT_CONCURRENCY",
                Self::DEFAULT_IMPORT_CONCURRENCY,
            ),
            cache_ttl: env_duration_millis("CONTACTS_CACHE_TTL_MS", Self::DEFAULT_CACHE_TTL_MS),
        }
    }
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            max_import_records: Self::DEFAULT_MAX_IMPORT_RECORDS,
            import_concurrency: Self::DEFAULT_IMPORT_CONCURRENCY,
            cache_ttl: Duration::from_millis(Self::DEFAULT_CACHE_TTL_MS),
        }
    }
}
