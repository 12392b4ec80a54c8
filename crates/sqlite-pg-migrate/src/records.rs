//! Typed records for the five catalog tables.
//!
//! Each type normalizes the loosely-typed source row into strict fields at
//! construction: UUID text becomes [`Uuid`], ISO-8601 text becomes a
//! timezone-aware [`DateTime<Utc>`], and nullable text columns collapse to an
//! empty string rather than carrying NULL into the destination. Construction
//! fails with [`ValidationError`] when a required field is absent or an
//! identifier/timestamp cannot be parsed.

use crate::error::ValidationError;
use crate::value::{RawRow, SqlValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

/// Natural key used by the consistency checker to collapse duplicates the
/// same way the destination's conflict policy absorbs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Id(Uuid),
    Pair(Uuid, Uuid),
}

/// A typed catalog record tied to one source table.
pub trait Record: Sized + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Table name, identical in source and destination.
    const TABLE: &'static str;

    /// Ordered source column list.
    const COLUMNS: &'static [&'static str];

    /// Conflict-target columns for the destination upsert.
    const CONFLICT_TARGET: &'static [&'static str];

    /// Construct from a raw source row, validating and normalizing fields.
    fn from_row(row: &RawRow) -> Result<Self, ValidationError>;

    fn id(&self) -> Uuid;

    /// Key the checker collapses duplicates on.
    fn natural_key(&self) -> RecordKey {
        RecordKey::Id(self.id())
    }

    /// Insert parameter values, one per entry of [`Self::COLUMNS`].
    fn params(&self) -> Vec<&(dyn ToSql + Sync)>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilmWork {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub creation_date: Option<NaiveDate>,
    pub file_path: String,
    pub rating: Option<f64>,
    pub r#type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub genre_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub person_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl Record for FilmWork {
    const TABLE: &'static str = "film_work";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "description",
        "creation_date",
        "file_path",
        "rating",
        "type",
        "created_at",
        "updated_at",
    ];
    const CONFLICT_TARGET: &'static [&'static str] = &["id"];

    fn from_row(row: &RawRow) -> Result<Self, ValidationError> {
        let rating = optional_number(row, "rating")?;
        if let Some(value) = rating {
            if !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::RatingOutOfRange(value));
            }
        }

        Ok(Self {
            id: uuid_field(row, "id")?,
            title: required_text(row, "title")?,
            description: nullable_text(row, "description")?,
            creation_date: optional_date(row, "creation_date")?,
            file_path: nullable_text(row, "file_path")?,
            rating,
            r#type: nullable_text(row, "type")?,
            created_at: timestamp_field(row, "created_at")?,
            updated_at: timestamp_field(row, "updated_at")?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        vec![
            &self.id,
            &self.title,
            &self.description,
            &self.creation_date,
            &self.file_path,
            &self.rating,
            &self.r#type,
            &self.created_at,
            &self.updated_at,
        ]
    }
}

impl Record for Person {
    const TABLE: &'static str = "person";
    const COLUMNS: &'static [&'static str] = &["id", "full_name", "created_at", "updated_at"];
    const CONFLICT_TARGET: &'static [&'static str] = &["id"];

    fn from_row(row: &RawRow) -> Result<Self, ValidationError> {
        Ok(Self {
            id: uuid_field(row, "id")?,
            full_name: required_text(row, "full_name")?,
            created_at: timestamp_field(row, "created_at")?,
            updated_at: timestamp_field(row, "updated_at")?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        vec![&self.id, &self.full_name, &self.created_at, &self.updated_at]
    }
}

impl Record for Genre {
    const TABLE: &'static str = "genre";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "description", "created_at", "updated_at"];
    const CONFLICT_TARGET: &'static [&'static str] = &["id"];

    fn from_row(row: &RawRow) -> Result<Self, ValidationError> {
        Ok(Self {
            id: uuid_field(row, "id")?,
            name: required_text(row, "name")?,
            description: nullable_text(row, "description")?,
            created_at: timestamp_field(row, "created_at")?,
            updated_at: timestamp_field(row, "updated_at")?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        vec![
            &self.id,
            &self.name,
            &self.description,
            &self.created_at,
            &self.updated_at,
        ]
    }
}

impl Record for GenreFilmWork {
    const TABLE: &'static str = "genre_film_work";
    const COLUMNS: &'static [&'static str] = &["id", "film_work_id", "genre_id", "created_at"];
    // Conflict resolution is by identifier alone: duplicate genre-film pairs
    // with distinct ids are written as-is, and only the checker collapses
    // them. The person junction below keys on the pair instead.
    const CONFLICT_TARGET: &'static [&'static str] = &["id"];

    fn from_row(row: &RawRow) -> Result<Self, ValidationError> {
        Ok(Self {
            id: uuid_field(row, "id")?,
            film_work_id: uuid_field(row, "film_work_id")?,
            genre_id: uuid_field(row, "genre_id")?,
            created_at: timestamp_field(row, "created_at")?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> RecordKey {
        RecordKey::Pair(self.film_work_id, self.genre_id)
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        vec![
            &self.id,
            &self.film_work_id,
            &self.genre_id,
            &self.created_at,
        ]
    }
}

impl Record for PersonFilmWork {
    const TABLE: &'static str = "person_film_work";
    const COLUMNS: &'static [&'static str] =
        &["id", "film_work_id", "person_id", "role", "created_at"];
    const CONFLICT_TARGET: &'static [&'static str] = &["film_work_id", "person_id"];

    fn from_row(row: &RawRow) -> Result<Self, ValidationError> {
        Ok(Self {
            id: uuid_field(row, "id")?,
            film_work_id: uuid_field(row, "film_work_id")?,
            person_id: uuid_field(row, "person_id")?,
            role: required_text(row, "role")?,
            created_at: timestamp_field(row, "created_at")?,
        })
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn natural_key(&self) -> RecordKey {
        RecordKey::Pair(self.film_work_id, self.person_id)
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        vec![
            &self.id,
            &self.film_work_id,
            &self.person_id,
            &self.role,
            &self.created_at,
        ]
    }
}

fn required<'a>(row: &'a RawRow, field: &'static str) -> Result<&'a SqlValue, ValidationError> {
    match row.get(field) {
        Some(SqlValue::Null) | None => Err(ValidationError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

/// UUID from canonical text, or from the 16-byte binary form.
fn uuid_field(row: &RawRow, field: &'static str) -> Result<Uuid, ValidationError> {
    match required(row, field)? {
        SqlValue::Text(s) => Uuid::parse_str(s).map_err(|_| ValidationError::InvalidUuid {
            field,
            value: s.clone(),
        }),
        SqlValue::Blob(bytes) => {
            Uuid::from_slice(bytes).map_err(|_| ValidationError::InvalidUuid {
                field,
                value: format!("<{} byte blob>", bytes.len()),
            })
        }
        other => Err(ValidationError::InvalidUuid {
            field,
            value: format!("{other:?}"),
        }),
    }
}

fn timestamp_field(row: &RawRow, field: &'static str) -> Result<DateTime<Utc>, ValidationError> {
    match required(row, field)? {
        SqlValue::Text(s) => parse_timestamp(s).ok_or_else(|| ValidationError::InvalidTimestamp {
            field,
            value: s.clone(),
        }),
        other => Err(ValidationError::InvalidTimestamp {
            field,
            value: format!("{other:?}"),
        }),
    }
}

/// ISO-8601 instant, with or without a UTC offset. Offset-less timestamps
/// are taken as UTC so every stored instant is timezone-aware.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn optional_date(row: &RawRow, field: &'static str) -> Result<Option<NaiveDate>, ValidationError> {
    match row.get(field) {
        Some(SqlValue::Null) | None => Ok(None),
        Some(SqlValue::Text(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ValidationError::InvalidDate {
                field,
                value: s.clone(),
            }),
        Some(other) => Err(ValidationError::InvalidDate {
            field,
            value: format!("{other:?}"),
        }),
    }
}

/// Nullable text column: NULL collapses to the empty string and numeric
/// values are stringified rather than rejected.
fn nullable_text(row: &RawRow, field: &'static str) -> Result<String, ValidationError> {
    match row.get(field) {
        Some(SqlValue::Null) | None => Ok(String::new()),
        Some(value) => text_of(value, field),
    }
}

fn required_text(row: &RawRow, field: &'static str) -> Result<String, ValidationError> {
    text_of(required(row, field)?, field)
}

fn text_of(value: &SqlValue, field: &'static str) -> Result<String, ValidationError> {
    match value {
        SqlValue::Text(s) => Ok(s.clone()),
        SqlValue::Integer(n) => Ok(n.to_string()),
        SqlValue::Real(n) => Ok(n.to_string()),
        SqlValue::Blob(_) => Err(ValidationError::NotText { field }),
        SqlValue::Null => Ok(String::new()),
    }
}

fn optional_number(row: &RawRow, field: &'static str) -> Result<Option<f64>, ValidationError> {
    match row.get(field) {
        Some(SqlValue::Null) | None => Ok(None),
        Some(SqlValue::Real(n)) => Ok(Some(*n)),
        Some(SqlValue::Integer(n)) => Ok(Some(*n as f64)),
        Some(SqlValue::Text(s)) => {
            s.parse::<f64>()
                .map(Some)
                .map_err(|_| ValidationError::InvalidNumber {
                    field,
                    value: s.clone(),
                })
        }
        Some(other) => Err(ValidationError::InvalidNumber {
            field,
            value: format!("{other:?}"),
        }),
    }
}
