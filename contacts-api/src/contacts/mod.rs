//! Contact storage and bulk import.
//!
//! This module provides the pipeline that reconciles uploaded contact rows
//! with what an environment already holds:
//!
//! 1. **Preparation** (`prepare`) - validates a batch and maps columns to attribute keys
//! 2. **Repository** (`repository`) - storage seam, with PostgreSQL (`postgres`)
//!    and in-memory (`memory`) implementations
//! 3. **Coordination** (`importer`) - dedup, userId checks, key reconciliation and
//!    concurrent per-record writes
//! 4. **Statistics** (`stats`) - per-batch counts and failures
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use contacts_api::contacts::{ContactImporter, DuplicateAction, PgContactRepository};
//!
//! let repository = Arc::new(PgContactRepository::new(pool));
//! let importer = ContactImporter::new(repository, Arc::new(NoopInvalidator), &config);
//!
//! let report = importer
//!     .import(records, environment_id, DuplicateAction::Update, &attribute_map)
//!     .await?;
//!
//! println!("wrote {} contacts", report.stats.affected());
//! ```

pub mod error;
pub mod importer;
pub mod memory;
pub mod postgres;
pub(crate) mod prepare;
pub mod records_file;
pub mod repository;
pub mod service;
pub mod stats;
pub mod types;

// Re-export main types
pub use error::{ImportError, StoreError, ValidationError};
pub use importer::ContactImporter;
pub use memory::InMemoryContactRepository;
pub use postgres::PgContactRepository;
pub use repository::ContactRepository;
pub use service::{ContactService, LookupError};
pub use stats::{ImportReport, ImportStats, RecordFailure};
pub use types::{AttributeMap, DuplicateAction, ImportRecord};
