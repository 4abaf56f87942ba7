use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use contacts_api::cache::NoopInvalidator;
use contacts_api::config::ContactsConfig;
use contacts_api::contacts::records_file::load_records;
use contacts_api::contacts::{
    AttributeMap, ContactImporter, ContactRepository, DuplicateAction, ImportStats,
    PgContactRepository,
};
use contacts_api::db::run_migrations;

#[derive(Parser, Debug)]
#[command(
    name = "import_contacts",
    about = "Import contacts from a JSON file into an environment"
)]
struct Args {
    /// Environment receiving the contacts.
    #[arg(long)]
    environment: Uuid,

    /// JSON file holding an array of flat objects, one per row.
    #[arg(long)]
    file: PathBuf,

    /// Handling of rows whose email already exists (`skip`, `update` or `overwrite`).
    #[arg(long, default_value = "update")]
    action: DuplicateAction,

    /// Rename a column to an attribute key, as `column=key`. Repeatable.
    #[arg(long = "map", value_parser = parse_mapping)]
    mappings: Vec<(String, String)>,

    /// Apply pending migrations before importing.
    #[arg(long)]
    migrate: bool,
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((column, key)) if !column.trim().is_empty() && !key.trim().is_empty() => {
            Ok((column.trim().to_string(), key.trim().to_string()))
        }
        _ => Err(format!("expected column=key, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let attribute_map: AttributeMap = args.mappings.into_iter().collect();

    let records = match load_records(&args.file) {
        Ok(records) => records,
        Err(err) => {
            writeln!(io::stderr(), "error: {}: {err}", args.file.display())?;
            std::process::exit(1);
        }
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    if args.migrate {
        run_migrations(&pool).await?;
    }

    let repository = Arc::new(PgContactRepository::new(pool.clone()));
    if !repository.environment_exists(args.environment).await? {
        writeln!(
            io::stderr(),
            "error: environment '{}' does not exist.",
            args.environment
        )?;
        std::process::exit(1);
    }

    let config = ContactsConfig::from_env();
    let chunk_size = config.max_import_records;
    let importer = ContactImporter::new(repository, Arc::new(NoopInvalidator), &config);

    let mut totals = ImportStats::default();
    let mut failures = 0usize;

    for (chunk_index, chunk) in records.chunks(chunk_size).enumerate() {
        let offset = chunk_index * chunk_size;
        let report = match importer
            .import(chunk.to_vec(), args.environment, args.action, &attribute_map)
            .await
        {
            Ok(report) => report,
            Err(err) => {
                writeln!(
                    io::stderr(),
                    "error: rows {}..{} rejected: {err}",
                    offset,
                    offset + chunk.len()
                )?;
                std::process::exit(1);
            }
        };

        for failure in &report.failures {
            writeln!(
                io::stderr(),
                "row {} ({}): {}",
                offset + failure.row,
                failure.email,
                failure.message
            )?;
        }
        failures += report.failures.len();
        totals.merge(report.stats);
    }

    println!(
        "imported {} records: {} created, {} updated, {} overwritten, {} skipped, {} dropped, {} failed, {} new attribute keys",
        records.len(),
        totals.created,
        totals.updated,
        totals.overwritten,
        totals.skipped,
        totals.dropped,
        totals.failed,
        totals.attribute_keys_created
    );

    pool.close().await;

    if failures > 0 {
        std::process::exit(2);
    }

    Ok(())
}
