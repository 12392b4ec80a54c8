//! End-to-end pipeline tests against a temporary SQLite database.
//!
//! Everything except the final `#[ignore]`d roundtrip runs without external
//! services: fixtures are written to a temp-file SQLite database, then read
//! back through the public reader/transformer API.

use sqlite_pg_migrate::verify::collapse_by_natural_key;
use sqlite_pg_migrate::{
    FilmWork, Genre, GenreFilmWork, Person, PersonFilmWork, Record, SqliteSource, TypedBatches,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GENRE_ID: &str = "3d8d9bf5-0d90-4353-88ba-4ccc5d2c07ff";
const PERSON_ID: &str = "26e83050-29ef-4163-a99d-b546cac208f8";
const FILM_ID: &str = "025c58cd-1b7e-43be-9ffb-8571a613579b";
const GFW_ID: &str = "77777777-7777-7777-7777-777777777777";
const PFW_ID: &str = "88888888-8888-8888-8888-888888888888";
const CREATED: &str = "2021-06-16 20:14:09.221838+00";
const UPDATED: &str = "2021-06-16 20:14:09.221855+00";

async fn open_fixture(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for ddl in [
        "CREATE TABLE person (id TEXT PRIMARY KEY, full_name TEXT, created_at TEXT, updated_at TEXT)",
        "CREATE TABLE genre (id TEXT PRIMARY KEY, name TEXT, description TEXT, created_at TEXT, updated_at TEXT)",
        "CREATE TABLE film_work (id TEXT PRIMARY KEY, title TEXT, description TEXT, creation_date TEXT, \
         file_path TEXT, rating REAL, type TEXT, created_at TEXT, updated_at TEXT)",
        "CREATE TABLE genre_film_work (id TEXT PRIMARY KEY, film_work_id TEXT, genre_id TEXT, created_at TEXT)",
        "CREATE TABLE person_film_work (id TEXT PRIMARY KEY, film_work_id TEXT, person_id TEXT, role TEXT, created_at TEXT)",
    ] {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }

    pool
}

/// One row per table: the minimal catalog of the end-to-end scenario.
async fn seed_catalog(pool: &SqlitePool) {
    sqlx::query("INSERT INTO person VALUES (?1, 'George Lucas', ?2, ?3)")
        .bind(PERSON_ID)
        .bind(CREATED)
        .bind(UPDATED)
        .execute(pool)
        .await
        .unwrap();

    sqlx::query("INSERT INTO genre VALUES (?1, 'Action', NULL, ?2, ?3)")
        .bind(GENRE_ID)
        .bind(CREATED)
        .bind(UPDATED)
        .execute(pool)
        .await
        .unwrap();

    sqlx::query(
        "INSERT INTO film_work VALUES (?1, 'Star Wars', NULL, NULL, NULL, 75.5, 'movie', ?2, ?3)",
    )
    .bind(FILM_ID)
    .bind(CREATED)
    .bind(UPDATED)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO genre_film_work VALUES (?1, ?2, ?3, ?4)")
        .bind(GFW_ID)
        .bind(FILM_ID)
        .bind(GENRE_ID)
        .bind(CREATED)
        .execute(pool)
        .await
        .unwrap();

    sqlx::query("INSERT INTO person_film_work VALUES (?1, ?2, ?3, 'director', ?4)")
        .bind(PFW_ID)
        .bind(FILM_ID)
        .bind(PERSON_ID)
        .bind(CREATED)
        .execute(pool)
        .await
        .unwrap();
}

async fn fixture_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("db.sqlite");
    let pool = open_fixture(&path).await;
    seed_catalog(&pool).await;
    pool.close().await;
    path
}

async fn read_all<R: Record>(source: &SqliteSource, batch_size: usize) -> Vec<R> {
    let raw = source
        .read_batches(R::TABLE, R::COLUMNS, batch_size)
        .await
        .unwrap();
    let mut typed = TypedBatches::<R>::new(raw);

    let mut records = Vec::new();
    while let Some(batch) = typed.next_batch().await {
        records.extend(batch.unwrap());
    }
    records
}

#[tokio::test]
async fn test_catalog_reads_into_typed_records() {
    let dir = TempDir::new().unwrap();
    let path = fixture_db(&dir).await;
    let source = SqliteSource::connect(&path).await.unwrap();

    let people: Vec<Person> = read_all(&source, 100).await;
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].full_name, "George Lucas");

    let genres: Vec<Genre> = read_all(&source, 100).await;
    assert_eq!(genres.len(), 1);
    assert_eq!(genres[0].description, "");

    let films: Vec<FilmWork> = read_all(&source, 100).await;
    assert_eq!(films.len(), 1);
    let film = &films[0];
    assert_eq!(film.title, "Star Wars");
    assert_eq!(film.rating, Some(75.5));
    assert_eq!(film.r#type, "movie");
    assert_eq!(film.description, "");
    assert_eq!(film.file_path, "");
    assert_eq!(film.creation_date, None);

    let genre_links: Vec<GenreFilmWork> = read_all(&source, 100).await;
    assert_eq!(genre_links.len(), 1);
    assert_eq!(genre_links[0].film_work_id.to_string(), FILM_ID);

    let person_links: Vec<PersonFilmWork> = read_all(&source, 100).await;
    assert_eq!(person_links.len(), 1);
    assert_eq!(person_links[0].role, "director");
    assert_eq!(
        person_links[0].created_at,
        genre_links[0].created_at,
        "both junctions carry the same seeded instant"
    );
}

#[tokio::test]
async fn test_malformed_row_is_dropped_from_its_batch_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.sqlite");
    let pool = open_fixture(&path).await;
    seed_catalog(&pool).await;

    sqlx::query("INSERT INTO person VALUES ('not-a-uuid', 'Broken Row', ?1, ?2)")
        .bind(CREATED)
        .bind(UPDATED)
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let source = SqliteSource::connect(&path).await.unwrap();
    let people: Vec<Person> = read_all(&source, 100).await;

    assert_eq!(people.len(), 1);
    assert_eq!(people[0].full_name, "George Lucas");
}

#[tokio::test]
async fn test_duplicate_junction_pair_collapses_to_first() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.sqlite");
    let pool = open_fixture(&path).await;
    seed_catalog(&pool).await;

    // same (film_work_id, person_id) pair under a fresh identifier
    sqlx::query("INSERT INTO person_film_work VALUES (?1, ?2, ?3, 'director', ?4)")
        .bind("99999999-9999-9999-9999-999999999999")
        .bind(FILM_ID)
        .bind(PERSON_ID)
        .bind(CREATED)
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let source = SqliteSource::connect(&path).await.unwrap();
    let links: Vec<PersonFilmWork> = read_all(&source, 100).await;
    assert_eq!(links.len(), 2);

    let collapsed = collapse_by_natural_key(links);
    assert_eq!(collapsed.len(), 1);
    assert_eq!(collapsed[0].id.to_string(), PFW_ID);
}

/// Full roundtrip through a live destination. Expects the standard DB_*
/// environment and an empty `content` schema.
#[tokio::test]
#[ignore = "requires a running PostgreSQL with the content schema"]
async fn test_migration_roundtrip_against_postgres() {
    use sqlite_pg_migrate::{check_consistency, run_migration, Config, PgTarget};

    let dir = TempDir::new().unwrap();
    let path = fixture_db(&dir).await;

    let config = Config::from_env().unwrap();
    let source = SqliteSource::connect(&path).await.unwrap();
    let mut target = PgTarget::connect(&config.target).await.unwrap();

    let summary = run_migration(&source, &mut target, 100).await.unwrap();
    assert_eq!(summary.tables_success, 5);
    assert_eq!(summary.rows_migrated, 5);

    // re-running writes nothing new
    let rerun = run_migration(&source, &mut target, 100).await.unwrap();
    assert_eq!(rerun.tables_success, 5);
    assert_eq!(rerun.rows_migrated, 0);

    let report = check_consistency(&source, &target, 100).await.unwrap();
    assert_eq!(report.rows_compared, 5);
}
