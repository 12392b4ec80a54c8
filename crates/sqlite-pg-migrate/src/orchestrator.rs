//! Migration orchestrator - drives read, transform, write across all tables.

use crate::error::{MigrateError, Result};
use crate::records::{FilmWork, Genre, GenreFilmWork, Person, PersonFilmWork, Record};
use crate::source::SqliteSource;
use crate::target::PgTarget;
use crate::transform::TypedBatches;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

/// Fixed migration order: parent tables before the junctions that reference
/// them by foreign key.
pub const TABLE_ORDER: &[&str] = &[
    "person",
    "genre",
    "film_work",
    "genre_film_work",
    "person_film_work",
];

/// Per-table outcome of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub table: String,
    pub rows_migrated: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Final status: "completed" or "failed".
    pub status: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables successfully migrated.
    pub tables_success: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows written across all tables.
    pub rows_migrated: u64,

    /// Per-table row counts for successful tables.
    pub tables: Vec<TableResult>,

    /// List of failed table names.
    pub failed_tables: Vec<String>,
}

impl MigrationSummary {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row-count comparison for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountCheck {
    pub table: String,
    pub source_rows: i64,
    pub destination_rows: i64,
}

impl CountCheck {
    pub fn matches(&self) -> bool {
        self.source_rows == self.destination_rows
    }
}

/// Connection probe results for both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Run the migration end-to-end against two already-open store handles.
///
/// Tables are processed one at a time in [`TABLE_ORDER`]; each table's
/// transformed records are fully materialized before being handed to the
/// writer, bounding memory to one table rather than the whole catalog. A
/// table-level failure is recorded and the remaining tables still run; the
/// run as a whole errors if any table failed.
pub async fn run_migration(
    source: &SqliteSource,
    target: &mut PgTarget,
    batch_size: usize,
) -> Result<MigrationSummary> {
    let started_at = Utc::now();
    let start = Instant::now();

    info!("Starting migration run (batch size {batch_size})");

    let outcomes: Vec<(&str, Result<u64>)> = vec![
        (
            Person::TABLE,
            migrate_table::<Person>(source, target, batch_size).await,
        ),
        (
            Genre::TABLE,
            migrate_table::<Genre>(source, target, batch_size).await,
        ),
        (
            FilmWork::TABLE,
            migrate_table::<FilmWork>(source, target, batch_size).await,
        ),
        (
            GenreFilmWork::TABLE,
            migrate_table::<GenreFilmWork>(source, target, batch_size).await,
        ),
        (
            PersonFilmWork::TABLE,
            migrate_table::<PersonFilmWork>(source, target, batch_size).await,
        ),
    ];

    let mut tables = Vec::new();
    let mut failed_tables = Vec::new();
    let mut rows_migrated: u64 = 0;

    for (table, outcome) in outcomes {
        match outcome {
            Ok(rows) => {
                rows_migrated += rows;
                tables.push(TableResult {
                    table: table.to_string(),
                    rows_migrated: rows,
                });
            }
            Err(e) => {
                error!(table, "table migration failed: {}", e.format_detailed());
                failed_tables.push(table.to_string());
            }
        }
    }

    let completed_at = Utc::now();
    let duration_seconds = start.elapsed().as_millis() as f64 / 1000.0;

    let summary = MigrationSummary {
        status: if failed_tables.is_empty() {
            "completed".to_string()
        } else {
            "failed".to_string()
        },
        started_at,
        completed_at,
        duration_seconds,
        tables_total: TABLE_ORDER.len(),
        tables_success: tables.len(),
        tables_failed: failed_tables.len(),
        rows_migrated,
        tables,
        failed_tables: failed_tables.clone(),
    };

    info!(
        "Migration {}: {}/{} tables, {} rows in {:.1}s",
        summary.status,
        summary.tables_success,
        summary.tables_total,
        summary.rows_migrated,
        summary.duration_seconds
    );

    if !failed_tables.is_empty() {
        return Err(MigrateError::TablesFailed {
            tables: failed_tables.join(", "),
        });
    }

    Ok(summary)
}

/// Read, transform, and write a single table.
async fn migrate_table<R: Record>(
    source: &SqliteSource,
    target: &mut PgTarget,
    batch_size: usize,
) -> Result<u64> {
    info!(table = R::TABLE, "migrating table");

    let raw = source.read_batches(R::TABLE, R::COLUMNS, batch_size).await?;
    let mut typed = TypedBatches::<R>::new(raw);

    let mut records: Vec<R> = Vec::new();
    while let Some(batch) = typed.next_batch().await {
        records.extend(batch?);
    }

    let written = target.write_all(&records).await?;
    info!(table = R::TABLE, rows = written, "table migrated");
    Ok(written)
}

/// Compare per-table row counts between source and destination.
pub async fn validate(source: &SqliteSource, target: &PgTarget) -> Result<Vec<CountCheck>> {
    let mut checks = Vec::new();

    for table in TABLE_ORDER {
        let source_rows = source.row_count(table).await?;
        let destination_rows = target.row_count(table).await?;

        let check = CountCheck {
            table: table.to_string(),
            source_rows,
            destination_rows,
        };

        if check.matches() {
            info!("{}: {} rows (match)", table, source_rows);
        } else {
            warn!(
                "{}: source={} destination={} (MISMATCH)",
                table, source_rows, destination_rows
            );
        }

        checks.push(check);
    }

    Ok(checks)
}

/// Probe both store connections.
pub async fn health_check(source: &SqliteSource, target: &PgTarget) -> HealthCheck {
    let started = Instant::now();
    let source_result = source.test_connection().await;
    let source_latency_ms = started.elapsed().as_millis() as u64;

    let started = Instant::now();
    let target_result = target.test_connection().await;
    let target_latency_ms = started.elapsed().as_millis() as u64;

    let source_error = source_result.as_ref().err().map(|e| e.to_string());
    let target_error = target_result.as_ref().err().map(|e| e.to_string());

    HealthCheck {
        source_connected: source_result.is_ok(),
        source_latency_ms,
        source_error,
        target_connected: target_result.is_ok(),
        target_latency_ms,
        target_error,
        healthy: source_result.is_ok() && target_result.is_ok(),
    }
}
