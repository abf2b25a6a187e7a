//! Database access for the e-file metadata index
//!
//! The index lives in `state.sqlite` under the data root: two identically
//! shaped tables, one for the latest filing per organization/period and one
//! for every filing that has been displaced.

pub mod filings;

pub use filings::IndexTable;

use composer_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// File name of the index database inside the data root
pub const STATE_DB_FILE: &str = "state.sqlite";

/// Open (or create) the index database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    // WAL keeps readers off the writer's back while a commit is in flight
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;

    if newly_created {
        tracing::info!("Initialized new index database: {}", db_path.display());
    } else {
        tracing::info!("Opened existing index database: {}", db_path.display());
    }

    Ok(pool)
}

/// Single-connection in-memory index database (tests and dry runs)
pub async fn init_memory_pool() -> Result<SqlitePool> {
    // One connection: every ":memory:" connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create both index tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for table in [IndexTable::Latest, IndexTable::Superseded] {
        filings::create_table(pool, table).await?;
    }
    tracing::debug!("Index tables initialized (latest_filings, duplicates)");
    Ok(())
}
