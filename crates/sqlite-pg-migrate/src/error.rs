//! Error types for the migration library.

use thiserror::Error;

/// A raw source row that cannot be coerced into a typed record.
///
/// Recovered locally by the transformer: the offending row is logged and
/// dropped, and the batch continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is absent from the row.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// An identifier field does not hold a canonical UUID.
    #[error("field `{field}` is not a valid UUID: `{value}`")]
    InvalidUuid { field: &'static str, value: String },

    /// A timestamp field does not hold an ISO-8601 instant.
    #[error("field `{field}` is not a valid timestamp: `{value}`")]
    InvalidTimestamp { field: &'static str, value: String },

    /// A date field does not hold a `YYYY-MM-DD` calendar date.
    #[error("field `{field}` is not a valid date: `{value}`")]
    InvalidDate { field: &'static str, value: String },

    /// A numeric field holds a non-numeric value.
    #[error("field `{field}` is not numeric: `{value}`")]
    InvalidNumber { field: &'static str, value: String },

    /// A text field holds a value with no text form (binary blob).
    #[error("field `{field}` holds binary data where text was expected")]
    NotText { field: &'static str },

    /// Rating outside the permitted range.
    #[error("field `rating` out of range 0..=100: {0}")]
    RatingOutOfRange(f64),
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing environment variable, bad port, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A row failed coercion outside the transformer's recovery path.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Requested table or column absent from the source database.
    #[error("Source read failed for table {table}: {message}")]
    SourceRead { table: String, message: String },

    /// Source database connection or query error.
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Destination database connection or query error.
    #[error("Destination database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A single-row insert failed for reasons other than a handled conflict.
    #[error("Write failed for table {table}: {message}")]
    DestinationWrite { table: String, message: String },

    /// Source and destination disagree after migration.
    #[error("Consistency check failed for table {table}: {message}")]
    ConsistencyMismatch { table: String, message: String },

    /// One or more tables failed during a migration run.
    #[error("Migration failed for table(s): {tables}")]
    TablesFailed { tables: String },

    /// IO error (log file, SQLite file path).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (summary/report output).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a SourceRead error.
    pub fn source_read(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SourceRead {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a DestinationWrite error.
    pub fn destination_write(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::DestinationWrite {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a ConsistencyMismatch error.
    pub fn mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::ConsistencyMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 1,
            MigrateError::Validation(_) => 2,
            MigrateError::SourceRead { .. } | MigrateError::Source(_) => 3,
            MigrateError::Target(_)
            | MigrateError::DestinationWrite { .. }
            | MigrateError::TablesFailed { .. } => 4,
            MigrateError::ConsistencyMismatch { .. } => 5,
            MigrateError::Io(_) | MigrateError::Json(_) => 7,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
