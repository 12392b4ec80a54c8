//! # sqlite-pg-migrate
//!
//! Migration of the movies catalog from an embedded SQLite database into
//! PostgreSQL, with an independent consistency checker.
//!
//! The pipeline reads each table in fixed-size batches, coerces the
//! loosely-typed rows into strict record types (dropping and logging rows
//! that fail validation), and bulk-upserts each table inside one
//! transaction with a do-nothing conflict policy, so re-runs against a
//! partially migrated destination are safe. The checker re-reads both
//! stores and asserts per-table set equivalence.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{run_migration, Config, PgTarget, SqliteSource};
//!
//! #[tokio::main]
//! async fn main() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::from_env()?;
//!     let source = SqliteSource::connect(&config.source.db_path).await?;
//!     let mut target = PgTarget::connect(&config.target).await?;
//!     let summary = run_migration(&source, &mut target, config.migration.batch_size).await?;
//!     println!("Migrated {} rows", summary.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod records;
pub mod source;
pub mod target;
pub mod transform;
pub mod value;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig, DEFAULT_BATCH_SIZE};
pub use error::{MigrateError, Result, ValidationError};
pub use orchestrator::{
    health_check, run_migration, validate, CountCheck, HealthCheck, MigrationSummary, TableResult,
    TABLE_ORDER,
};
pub use records::{FilmWork, Genre, GenreFilmWork, Person, PersonFilmWork, Record, RecordKey};
pub use source::{RowBatches, SqliteSource};
pub use target::{PgTarget, DEST_SCHEMA};
pub use transform::TypedBatches;
pub use value::{RawRow, SqlValue};
pub use verify::{check_consistency, ConsistencyReport, TableCheck};
