//! Configuration loading from the environment.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default batch size for source reads.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (SQLite).
    pub source: SourceConfig,

    /// Destination database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

/// Destination database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host (default: 127.0.0.1).
    pub host: String,

    /// Database port (default: 5432).
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(skip_serializing)]
    pub password: String,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per source batch.
    pub batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `DB_NAME`, `DB_USER`, `DB_PASSWORD`. Optional with defaults:
    /// `DB_HOST` (127.0.0.1), `DB_PORT` (5432), `SQLITE_DB_PATH` (db.sqlite),
    /// `BATCH_SIZE` (100).
    pub fn from_env() -> Result<Self> {
        let database = require_var("DB_NAME")?;
        let user = require_var("DB_USER")?;
        let password = require_var("DB_PASSWORD")?;
        let host = env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match env::var("DB_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| MigrateError::Config(format!("DB_PORT is not a valid port: {raw}")))?,
            Err(_) => 5432,
        };

        let db_path =
            PathBuf::from(env::var("SQLITE_DB_PATH").unwrap_or_else(|_| "db.sqlite".to_string()));

        let batch_size = match env::var("BATCH_SIZE") {
            Ok(raw) => {
                let parsed = raw.parse::<usize>().map_err(|_| {
                    MigrateError::Config(format!("BATCH_SIZE is not a valid size: {raw}"))
                })?;
                if parsed == 0 {
                    return Err(MigrateError::Config("BATCH_SIZE must be positive".into()));
                }
                parsed
            }
            Err(_) => DEFAULT_BATCH_SIZE,
        };

        Ok(Self {
            source: SourceConfig { db_path },
            target: TargetConfig {
                host,
                port,
                database,
                user,
                password,
            },
            migration: MigrationConfig { batch_size },
        })
    }
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

fn require_var(name: &'static str) -> Result<String> {
    env::var(name).map_err(|_| MigrateError::Config(format!("{name} is not set")))
}
