//! SQLite source reader.
//!
//! Streams rows out of the embedded database in fixed-size batches without
//! ever materializing a whole table: a producer task walks the query cursor
//! and hands batches through a bounded channel, so at most a couple of
//! batches are in flight at any time.

use crate::error::{MigrateError, Result};
use crate::value::{RawRow, SqlValue};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// How many read batches may sit in the channel ahead of the consumer.
const READ_AHEAD_BATCHES: usize = 2;

/// Handle to the source SQLite database.
pub struct SqliteSource {
    pool: SqlitePool,
}

/// A lazy, finite, non-restartable sequence of row batches for one table.
#[derive(Debug)]
pub struct RowBatches {
    rx: mpsc::Receiver<Result<Vec<RawRow>>>,
}

impl RowBatches {
    /// Next batch in source iteration order, or `None` once the table is
    /// exhausted.
    pub async fn next_batch(&mut self) -> Option<Result<Vec<RawRow>>> {
        self.rx.recv().await
    }
}

impl SqliteSource {
    /// Open the database file read-only with a single connection.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!("Connected to SQLite source: {}", path.display());

        Ok(Self { pool })
    }

    /// Probe the connection.
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Stream `SELECT <columns> FROM <table>` as batches of at most
    /// `batch_size` rows, preserving iteration order.
    ///
    /// Fails with [`MigrateError::SourceRead`] if the table or a requested
    /// column does not exist.
    pub async fn read_batches(
        &self,
        table: &str,
        columns: &[&str],
        batch_size: usize,
    ) -> Result<RowBatches> {
        self.validate_columns(table, columns).await?;

        let column_names: Arc<Vec<String>> =
            Arc::new(columns.iter().map(|c| c.to_string()).collect());

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", column_list, quote_ident(table));

        let (tx, rx) = mpsc::channel(READ_AHEAD_BATCHES);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let mut stream = sqlx::query(&sql).fetch(&pool);
            let mut batch: Vec<RawRow> = Vec::with_capacity(batch_size);

            loop {
                match stream.try_next().await {
                    Ok(Some(row)) => match decode_row(&row, &column_names) {
                        Ok(raw) => {
                            batch.push(raw);
                            if batch.len() == batch_size {
                                let full = std::mem::replace(
                                    &mut batch,
                                    Vec::with_capacity(batch_size),
                                );
                                if tx.send(Ok(full)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e.into())).await;
                            return;
                        }
                    },
                    Ok(None) => {
                        if !batch.is_empty() {
                            let _ = tx.send(Ok(batch)).await;
                        }
                        return;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }
        });

        Ok(RowBatches { rx })
    }

    /// Total rows in a table.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table));
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Column names of a table, empty when the table does not exist.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
    }

    async fn validate_columns(&self, table: &str, columns: &[&str]) -> Result<()> {
        let existing = self.table_columns(table).await?;
        if existing.is_empty() {
            return Err(MigrateError::source_read(table, "table does not exist"));
        }

        for column in columns {
            if !existing.iter().any(|c| c == column) {
                return Err(MigrateError::source_read(
                    table,
                    format!("column `{column}` does not exist"),
                ));
            }
        }

        Ok(())
    }
}

/// Quote a SQLite identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Lower one driver row into the loose storage-class representation.
fn decode_row(
    row: &SqliteRow,
    columns: &Arc<Vec<String>>,
) -> std::result::Result<RawRow, sqlx::Error> {
    let mut values = Vec::with_capacity(columns.len());

    for i in 0..columns.len() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let type_name = raw.type_info().name().to_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    SqlValue::Integer(row.try_get::<i64, _>(i)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    SqlValue::Real(row.try_get::<f64, _>(i)?)
                }
                "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(i)?),
                _ => SqlValue::Text(row.try_get::<String, _>(i)?),
            }
        };
        values.push(value);
    }

    Ok(RawRow::new(columns.clone(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_source() -> SqliteSource {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        SqliteSource { pool }
    }

    async fn seed_person(source: &SqliteSource, rows: usize) {
        sqlx::query(
            "CREATE TABLE person (id TEXT PRIMARY KEY, full_name TEXT, \
             created_at TEXT, updated_at TEXT)",
        )
        .execute(&source.pool)
        .await
        .unwrap();

        for i in 0..rows {
            sqlx::query("INSERT INTO person VALUES (?1, ?2, ?3, ?4)")
                .bind(format!("00000000-0000-0000-0000-{i:012}"))
                .bind(format!("person {i}"))
                .bind("2021-06-16 20:14:09.221838+00")
                .bind("2021-06-16 20:14:09.221855+00")
                .execute(&source.pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_batch_completeness() {
        let source = memory_source().await;
        seed_person(&source, 205).await;

        let mut batches = source
            .read_batches("person", &["id", "full_name"], 50)
            .await
            .unwrap();

        let mut sizes = Vec::new();
        let mut names = Vec::new();
        while let Some(batch) = batches.next_batch().await {
            let batch = batch.unwrap();
            sizes.push(batch.len());
            for row in &batch {
                names.push(match row.get("full_name") {
                    Some(SqlValue::Text(s)) => s.clone(),
                    other => panic!("unexpected value: {other:?}"),
                });
            }
        }

        assert_eq!(sizes, vec![50, 50, 50, 50, 5]);
        let expected: Vec<String> = (0..205).map(|i| format!("person {i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_batch() {
        let source = memory_source().await;
        seed_person(&source, 100).await;

        let mut batches = source
            .read_batches("person", &["id"], 50)
            .await
            .unwrap();

        let mut sizes = Vec::new();
        while let Some(batch) = batches.next_batch().await {
            sizes.push(batch.unwrap().len());
        }

        assert_eq!(sizes, vec![50, 50]);
    }

    #[tokio::test]
    async fn test_missing_table_is_source_read_error() {
        let source = memory_source().await;

        let err = source
            .read_batches("film_work", &["id"], 50)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::SourceRead { table, .. } if table == "film_work"));
    }

    #[tokio::test]
    async fn test_missing_column_is_source_read_error() {
        let source = memory_source().await;
        seed_person(&source, 1).await;

        let err = source
            .read_batches("person", &["id", "birth_date"], 50)
            .await
            .unwrap_err();

        assert!(
            matches!(err, MigrateError::SourceRead { ref message, .. } if message.contains("birth_date"))
        );
    }

    #[tokio::test]
    async fn test_row_count() {
        let source = memory_source().await;
        seed_person(&source, 7).await;

        assert_eq!(source.row_count("person").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_null_and_numeric_values_decode_loosely() {
        let source = memory_source().await;
        sqlx::query("CREATE TABLE film_work (id TEXT, rating REAL, description TEXT)")
            .execute(&source.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO film_work VALUES ('a', 7.5, NULL)")
            .execute(&source.pool)
            .await
            .unwrap();

        let mut batches = source
            .read_batches("film_work", &["id", "rating", "description"], 10)
            .await
            .unwrap();

        let batch = batches.next_batch().await.unwrap().unwrap();
        assert_eq!(batch[0].get("rating"), Some(&SqlValue::Real(7.5)));
        assert_eq!(batch[0].get("description"), Some(&SqlValue::Null));
    }
}
