//! sqlite-pg-migrate CLI - SQLite to PostgreSQL migration for the movies catalog.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{
    check_consistency, health_check, run_migration, validate, Config, MigrateError, PgTarget,
    SqliteSource,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "SQLite to PostgreSQL migration for the movies catalog")]
#[command(version)]
struct Cli {
    /// Path to the persistent log file
    #[arg(long, default_value = "migration.log")]
    log_file: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration end-to-end
    Run {
        /// Override the SQLite database path
        #[arg(long)]
        sqlite_path: Option<PathBuf>,

        /// Override the source batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Verify record-level consistency between source and destination
    Check {
        /// Override the SQLite database path
        #[arg(long)]
        sqlite_path: Option<PathBuf>,

        /// Override the source batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Validate row counts between source and destination
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format, &cli.log_file)?;

    dotenv::dotenv().ok();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Run {
            sqlite_path,
            batch_size,
        } => {
            apply_overrides(&mut config, sqlite_path, batch_size);

            let source = SqliteSource::connect(&config.source.db_path).await?;
            let mut target = PgTarget::connect(&config.target).await?;

            let summary = run_migration(&source, &mut target, config.migration.batch_size).await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Duration: {:.2}s", summary.duration_seconds);
                println!(
                    "  Tables: {}/{}",
                    summary.tables_success, summary.tables_total
                );
                println!("  Rows: {}", summary.rows_migrated);
            }
        }

        Commands::Check {
            sqlite_path,
            batch_size,
        } => {
            apply_overrides(&mut config, sqlite_path, batch_size);

            let source = SqliteSource::connect(&config.source.db_path).await?;
            let target = PgTarget::connect(&config.target).await?;

            let report = check_consistency(&source, &target, config.migration.batch_size).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nConsistency check passed!");
                for table in &report.tables {
                    println!("  ✓ {} ({} rows)", table.table, table.rows_compared);
                }
            }
        }

        Commands::Validate => {
            let source = SqliteSource::connect(&config.source.db_path).await?;
            let target = PgTarget::connect(&config.target).await?;

            let checks = validate(&source, &target).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                for check in &checks {
                    let status = if check.matches() { "✓" } else { "✗" };
                    println!(
                        "  {} {} (source: {}, destination: {})",
                        status, check.table, check.source_rows, check.destination_rows
                    );
                }
            }

            let mismatched: Vec<&str> = checks
                .iter()
                .filter(|c| !c.matches())
                .map(|c| c.table.as_str())
                .collect();

            if !mismatched.is_empty() {
                return Err(MigrateError::mismatch(
                    mismatched.join(", "),
                    "row counts differ between source and destination",
                ));
            }

            println!("\nRow counts match for all tables");
        }

        Commands::HealthCheck => {
            let source = SqliteSource::connect(&config.source.db_path).await?;
            let target = PgTarget::connect(&config.target).await?;

            let result = health_check(&source, &target).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (SQLite): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, sqlite_path: Option<PathBuf>, batch_size: Option<usize>) {
    if let Some(path) = sqlite_path {
        config.source.db_path = path;
    }
    if let Some(size) = batch_size {
        config.migration.batch_size = size;
    }
    info!(
        "Using SQLite database {} with batch size {}",
        config.source.db_path.display(),
        config.migration.batch_size
    );
}

/// Log to stdout and to a persistent file at once.
fn setup_logging(verbosity: &str, format: &str, log_file: &Path) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    let file = Arc::new(file);

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::from_level(level));

    if format == "json" {
        let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).json();
        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(file)
            .json();
        registry.with(stdout_layer).with(file_layer).init();
    } else {
        let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(file);
        registry.with(stdout_layer).with(file_layer).init();
    }

    Ok(())
}
