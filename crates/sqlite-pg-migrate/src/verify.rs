//! Post-migration consistency checker.
//!
//! Independently re-reads every source row and every destination row whose
//! identifier appears in the source, reconstructs typed records on both
//! sides through the same validating constructors, and asserts per-table set
//! equivalence. Runnable on its own against any already-migrated
//! destination; this is the acceptance test for the whole migration.

use crate::error::{MigrateError, Result};
use crate::records::{FilmWork, Genre, GenreFilmWork, Person, PersonFilmWork, Record};
use crate::source::SqliteSource;
use crate::target::PgTarget;
use crate::value::{RawRow, SqlValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_postgres::Row as PgRow;
use tracing::info;
use uuid::Uuid;

/// Per-table outcome of a consistency pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCheck {
    pub table: String,
    pub rows_compared: usize,
}

/// Result of a full consistency pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub tables: Vec<TableCheck>,
    pub rows_compared: usize,
}

impl ConsistencyReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Check every table; the first mismatch aborts the pass with a
/// [`MigrateError::ConsistencyMismatch`] naming the table.
pub async fn check_consistency(
    source: &SqliteSource,
    target: &PgTarget,
    batch_size: usize,
) -> Result<ConsistencyReport> {
    let tables = vec![
        check_table::<Person>(source, target, batch_size).await?,
        check_table::<Genre>(source, target, batch_size).await?,
        check_table::<FilmWork>(source, target, batch_size).await?,
        check_table::<GenreFilmWork>(source, target, batch_size).await?,
        check_table::<PersonFilmWork>(source, target, batch_size).await?,
    ];

    let rows_compared = tables.iter().map(|t| t.rows_compared).sum();

    info!(
        "Consistency check passed: {} tables, {} rows",
        tables.len(),
        rows_compared
    );

    Ok(ConsistencyReport {
        tables,
        rows_compared,
    })
}

async fn check_table<R: Record>(
    source: &SqliteSource,
    target: &PgTarget,
    batch_size: usize,
) -> Result<TableCheck> {
    info!(table = R::TABLE, "checking table");

    // Full strict re-read of the source side. Unlike migration, a coercion
    // failure here is fatal: the checker has no recovery path.
    let mut batches = source.read_batches(R::TABLE, R::COLUMNS, batch_size).await?;
    let mut source_records: Vec<R> = Vec::new();
    while let Some(batch) = batches.next_batch().await {
        for row in batch? {
            source_records.push(R::from_row(&row)?);
        }
    }

    // Collapse duplicates sharing a natural key before comparison, matching
    // what the destination's do-nothing conflict policy absorbed.
    let source_records = collapse_by_natural_key(source_records);

    let ids: Vec<Uuid> = source_records.iter().map(|r| r.id()).collect();
    let pg_rows = target.fetch_by_ids(R::TABLE, R::COLUMNS, &ids).await?;

    let mut dest_records: Vec<R> = Vec::with_capacity(pg_rows.len());
    for row in &pg_rows {
        let raw = lower_pg_row(R::TABLE, row)?;
        dest_records.push(R::from_row(&raw)?);
    }

    let rows_compared = compare_sorted(R::TABLE, source_records, dest_records)?;

    info!(table = R::TABLE, rows = rows_compared, "table consistent");

    Ok(TableCheck {
        table: R::TABLE.to_string(),
        rows_compared,
    })
}

/// Drop records whose natural key was already seen; the first occurrence
/// wins, mirroring the insert-order do-nothing behavior at the destination.
pub fn collapse_by_natural_key<R: Record>(records: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.natural_key()))
        .collect()
}

/// Sort both sides by identifier and compare count then each pair.
fn compare_sorted<R: Record>(table: &str, mut source: Vec<R>, mut dest: Vec<R>) -> Result<usize> {
    source.sort_by_key(|r| r.id());
    dest.sort_by_key(|r| r.id());

    if source.len() != dest.len() {
        let dest_ids: HashSet<Uuid> = dest.iter().map(|r| r.id()).collect();
        let missing: Vec<Uuid> = source
            .iter()
            .map(|r| r.id())
            .filter(|id| !dest_ids.contains(id))
            .take(10)
            .collect();

        return Err(MigrateError::mismatch(
            table,
            format!(
                "row count differs: source={} destination={}; missing from destination: {missing:?}",
                source.len(),
                dest.len()
            ),
        ));
    }

    for (s, d) in source.iter().zip(dest.iter()) {
        if s != d {
            return Err(MigrateError::mismatch(
                table,
                format!("record {} differs: source={s:?} destination={d:?}", s.id()),
            ));
        }
    }

    Ok(source.len())
}

/// Lower one destination row into the loose row form so both sides flow
/// through the same validating constructors.
fn lower_pg_row(table: &str, row: &PgRow) -> Result<RawRow> {
    let columns: Arc<Vec<String>> = Arc::new(
        row.columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    );

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "uuid" => row
                .try_get::<_, Option<Uuid>>(i)?
                .map(|u| SqlValue::Text(u.to_string())),
            "timestamptz" => row
                .try_get::<_, Option<DateTime<Utc>>>(i)?
                .map(|t| SqlValue::Text(t.to_rfc3339())),
            "timestamp" => row
                .try_get::<_, Option<NaiveDateTime>>(i)?
                .map(|t| SqlValue::Text(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "date" => row
                .try_get::<_, Option<NaiveDate>>(i)?
                .map(|d| SqlValue::Text(d.to_string())),
            "float8" => row.try_get::<_, Option<f64>>(i)?.map(SqlValue::Real),
            "float4" => row
                .try_get::<_, Option<f32>>(i)?
                .map(|n| SqlValue::Real(n as f64)),
            "int2" => row
                .try_get::<_, Option<i16>>(i)?
                .map(|n| SqlValue::Integer(n as i64)),
            "int4" => row
                .try_get::<_, Option<i32>>(i)?
                .map(|n| SqlValue::Integer(n as i64)),
            "int8" => row.try_get::<_, Option<i64>>(i)?.map(SqlValue::Integer),
            "bool" => row
                .try_get::<_, Option<bool>>(i)?
                .map(|b| SqlValue::Integer(b as i64)),
            "text" | "varchar" | "bpchar" => {
                row.try_get::<_, Option<String>>(i)?.map(SqlValue::Text)
            }
            other => {
                return Err(MigrateError::mismatch(
                    table,
                    format!(
                        "unsupported destination column type `{other}` for `{}`",
                        column.name()
                    ),
                ))
            }
        }
        .unwrap_or(SqlValue::Null);

        values.push(value);
    }

    Ok(RawRow::new(columns, values))
}
