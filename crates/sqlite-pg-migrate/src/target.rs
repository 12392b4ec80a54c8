//! PostgreSQL destination writer.
//!
//! Upserts typed records into the `content` schema, one transaction per
//! table, with a do-nothing conflict policy so a re-run against a partially
//! migrated destination skips already-present rows instead of duplicating or
//! erroring on them.

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use crate::records::Record;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Fixed destination namespace for the catalog tables.
pub const DEST_SCHEMA: &str = "content";

/// Destination column renames keyed by (table, source field). Unmapped
/// fields keep their source name.
const FIELD_MAPPING: &[(&str, &str, &str)] = &[
    ("person", "created_at", "created"),
    ("person", "updated_at", "modified"),
    ("genre", "created_at", "created"),
    ("genre", "updated_at", "modified"),
    ("film_work", "created_at", "created"),
    ("film_work", "updated_at", "modified"),
    ("genre_film_work", "created_at", "created"),
    ("person_film_work", "created_at", "created"),
];

/// Destination column name for a source field.
pub fn destination_column(table: &str, field: &'static str) -> &'static str {
    FIELD_MAPPING
        .iter()
        .find(|(t, f, _)| *t == table && *f == field)
        .map(|(_, _, dest)| *dest)
        .unwrap_or(field)
}

/// Handle to the destination PostgreSQL database.
pub struct PgTarget {
    client: Client,
}

impl PgTarget {
    /// Open a single connection, held for the process lifetime.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let (client, connection) =
            tokio_postgres::connect(&config.connection_string(), NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("destination connection error: {e}");
            }
        });

        info!(
            "Connected to PostgreSQL destination: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { client })
    }

    /// Probe the connection.
    pub async fn test_connection(&self) -> Result<()> {
        self.client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Bulk-upsert one table's records within a single transaction.
    ///
    /// Every row is inserted with a do-nothing conflict policy on the
    /// record's conflict target; returns how many rows were actually
    /// inserted (conflict-skipped rows count zero). The first failing row is
    /// logged with its record context and aborts the transaction; nothing of
    /// the table is committed in that case.
    pub async fn write_all<R: Record>(&mut self, records: &[R]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = build_insert_sql(R::TABLE, R::COLUMNS, R::CONFLICT_TARGET);
        debug!(table = R::TABLE, "{sql}");

        let tx = self.client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;

        let mut written: u64 = 0;
        for record in records {
            match tx.execute(&stmt, &record.params()).await {
                Ok(inserted) => written += inserted,
                Err(e) => {
                    error!(table = R::TABLE, record = ?record, "insert failed: {e}");
                    return Err(MigrateError::destination_write(R::TABLE, e.to_string()));
                }
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Destination rows whose id is among `ids`, with destination columns
    /// aliased back to their source field names.
    pub async fn fetch_by_ids(
        &self,
        table: &str,
        columns: &[&'static str],
        ids: &[Uuid],
    ) -> Result<Vec<Row>> {
        let sql = build_select_by_ids_sql(table, columns);
        Ok(self.client.query(&sql, &[&ids]).await?)
    }

    /// Total rows in a destination table.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            qualify_table(DEST_SCHEMA, table)
        );
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
fn qualify_table(schema: &str, table: &str) -> String {
    format!("\"{}\".\"{}\"", schema, table)
}

/// Build the per-row upsert statement for a table.
fn build_insert_sql(
    table: &str,
    columns: &[&'static str],
    conflict_target: &[&'static str],
) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(destination_column(table, c)))
        .collect::<Vec<_>>()
        .join(", ");

    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let conflict_list = conflict_target
        .iter()
        .map(|c| quote_ident(destination_column(table, c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
        qualify_table(DEST_SCHEMA, table),
        column_list,
        placeholders,
        conflict_list
    )
}

/// Build the checker's read-back query, renaming destination columns to
/// source field names.
fn build_select_by_ids_sql(table: &str, columns: &[&'static str]) -> String {
    let select_list = columns
        .iter()
        .map(|c| {
            let dest = destination_column(table, c);
            if dest == *c {
                quote_ident(c)
            } else {
                format!("{} AS {}", quote_ident(dest), quote_ident(c))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {} FROM {} WHERE \"id\" = ANY($1)",
        select_list,
        qualify_table(DEST_SCHEMA, table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{GenreFilmWork, Person, PersonFilmWork, Record};

    #[test]
    fn test_field_mapping_renames_timestamps() {
        assert_eq!(destination_column("person", "created_at"), "created");
        assert_eq!(destination_column("person", "updated_at"), "modified");
        assert_eq!(destination_column("genre_film_work", "created_at"), "created");
    }

    #[test]
    fn test_field_mapping_identity_for_unmapped() {
        assert_eq!(destination_column("person", "full_name"), "full_name");
        assert_eq!(destination_column("film_work", "rating"), "rating");
    }

    #[test]
    fn test_insert_sql_for_primary_table() {
        let sql = build_insert_sql(Person::TABLE, Person::COLUMNS, Person::CONFLICT_TARGET);

        assert_eq!(
            sql,
            "INSERT INTO \"content\".\"person\" (\"id\", \"full_name\", \"created\", \"modified\") \
             VALUES ($1, $2, $3, $4) ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[test]
    fn test_person_junction_conflicts_on_pair() {
        let sql = build_insert_sql(
            PersonFilmWork::TABLE,
            PersonFilmWork::COLUMNS,
            PersonFilmWork::CONFLICT_TARGET,
        );

        assert!(sql.ends_with("ON CONFLICT (\"film_work_id\", \"person_id\") DO NOTHING"));
    }

    #[test]
    fn test_genre_junction_conflicts_on_id_only() {
        let sql = build_insert_sql(
            GenreFilmWork::TABLE,
            GenreFilmWork::COLUMNS,
            GenreFilmWork::CONFLICT_TARGET,
        );

        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_select_by_ids_aliases_renamed_columns() {
        let sql = build_select_by_ids_sql(Person::TABLE, Person::COLUMNS);

        assert_eq!(
            sql,
            "SELECT \"id\", \"full_name\", \"created\" AS \"created_at\", \
             \"modified\" AS \"updated_at\" FROM \"content\".\"person\" \
             WHERE \"id\" = ANY($1)"
        );
    }
}
