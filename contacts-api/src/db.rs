//! Database pool and schema migrations.
//!
//! Migrations are validated and applied before the API starts serving
//! requests; startup aborts when they fail.

use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};
use rocket_db_pools::Database;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Database)]
#[database("contacts_db")]
pub struct ContactsDb(sqlx::PgPool);

/// Run database migrations.
///
/// Idempotent: migrations that have already been applied are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");

    MIGRATOR.run(pool).await?;

    log::info!("database migrations up to date");
    Ok(())
}
