//! Read caching for contact lookups.
//!
//! Reads go through [`TagCache::get_or_compute`], which stores the computed
//! value under a key together with the [`CacheTag`]s it depends on. Writers
//! never touch cache keys directly: they emit the tags of the entities they
//! changed through a [`CacheInvalidator`], and every entry carrying one of
//! those tags is evicted.
//!
//! ## Layout
//!
//! - `types` - tags and the invalidation seam
//! - `tag_cache` - generic TTL cache with a tag index, built on DashMap
//! - `contact_cache` - the typed caches the HTTP handlers read through

mod contact_cache;
mod tag_cache;
mod types;

pub use contact_cache::ContactReadCache;
pub use tag_cache::TagCache;
pub use types::{CacheInvalidator, CacheTag, NoopInvalidator};
