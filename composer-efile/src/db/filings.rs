//! Index table operations
//!
//! Column set is fixed for compatibility with existing state databases:
//! `record_id, irs_efile_id, irs_dln, ein, period, name_org, form_type,
//! date_submitted, date_uploaded, url, date_downloaded`.
//!
//! `date_submitted` and `date_uploaded` hold the listing text verbatim
//! (`2011-03-16`, `2016-03-21T17:23:53`, ...); `date_downloaded` is SQLite's
//! `CURRENT_TIMESTAMP`.
//!
//! Every function takes a generic executor so the same statements run against
//! the pool or inside a commit transaction.

use crate::models::{FilingDescriptor, ListedTime};
use composer_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

/// The two durable filing sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTable {
    /// Authoritative filing per organization/period
    Latest,
    /// Every displaced filing
    Superseded,
}

impl IndexTable {
    pub fn name(self) -> &'static str {
        match self {
            IndexTable::Latest => "latest_filings",
            IndexTable::Superseded => "duplicates",
        }
    }
}

const COLUMNS: &str = "record_id, irs_efile_id, irs_dln, ein, period, name_org, form_type, \
                       date_submitted, date_uploaded, url";

pub async fn create_table(pool: &SqlitePool, table: IndexTable) -> Result<()> {
    let name = table.name();
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {name} (
            record_id TEXT NOT NULL,
            irs_efile_id TEXT NOT NULL UNIQUE,
            irs_dln TEXT,
            ein TEXT NOT NULL,
            period TEXT NOT NULL,
            name_org TEXT,
            form_type TEXT,
            date_submitted TEXT NOT NULL,
            date_uploaded TEXT NOT NULL,
            url TEXT,
            date_downloaded TEXT
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{name}_ein ON {name}(ein)"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{name}_record_id ON {name}(record_id)"
    ))
    .execute(pool)
    .await?;

    Ok(())
}

fn filing_from_row(row: &SqliteRow) -> Result<FilingDescriptor> {
    let submitted: String = row.try_get("date_submitted")?;
    let uploaded: String = row.try_get("date_uploaded")?;
    let text = |column: &str| -> Result<String> {
        Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
    };

    Ok(FilingDescriptor {
        record_id: row.try_get("record_id")?,
        irs_efile_id: row.try_get("irs_efile_id")?,
        irs_dln: text("irs_dln")?,
        ein: row.try_get("ein")?,
        period: row.try_get("period")?,
        name_org: text("name_org")?,
        form_type: text("form_type")?,
        date_submitted: ListedTime::try_from(submitted)?,
        date_uploaded: ListedTime::try_from(uploaded)?,
        url: text("url")?,
    })
}

async fn fetch_where<'e, E>(
    executor: E,
    table: IndexTable,
    column: &str,
    value: &str,
) -> Result<Vec<FilingDescriptor>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE {} = ? ORDER BY period, irs_efile_id",
        table.name(),
        column
    );
    let rows = sqlx::query(&sql).bind(value).fetch_all(executor).await?;
    rows.iter().map(filing_from_row).collect()
}

/// Distinct organization keys present in the table
pub async fn distinct_eins<'e, E>(executor: E, table: IndexTable) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT DISTINCT ein FROM {} ORDER BY ein", table.name());
    let eins: Vec<String> = sqlx::query_scalar(&sql).fetch_all(executor).await?;
    Ok(eins)
}

pub async fn filings_for_ein<'e, E>(
    executor: E,
    table: IndexTable,
    ein: &str,
) -> Result<Vec<FilingDescriptor>>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_where(executor, table, "ein", ein).await
}

pub async fn filings_by_record_id<'e, E>(
    executor: E,
    table: IndexTable,
    record_id: &str,
) -> Result<Vec<FilingDescriptor>>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_where(executor, table, "record_id", record_id).await
}

pub async fn filings_by_irs_efile_id<'e, E>(
    executor: E,
    table: IndexTable,
    irs_efile_id: &str,
) -> Result<Vec<FilingDescriptor>>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_where(executor, table, "irs_efile_id", irs_efile_id).await
}

/// Insert, or replace the row with the same `irs_efile_id`
pub async fn upsert<'e, E>(executor: E, table: IndexTable, filing: &FilingDescriptor) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        INSERT OR REPLACE INTO {} ({COLUMNS}, date_downloaded)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        "#,
        table.name()
    );
    sqlx::query(&sql)
        .bind(&filing.record_id)
        .bind(&filing.irs_efile_id)
        .bind(&filing.irs_dln)
        .bind(&filing.ein)
        .bind(&filing.period)
        .bind(&filing.name_org)
        .bind(&filing.form_type)
        .bind(filing.date_submitted.as_str())
        .bind(filing.date_uploaded.as_str())
        .bind(&filing.url)
        .execute(executor)
        .await?;
    Ok(())
}

/// Delete the row with this filing id; returns whether one existed
pub async fn delete_if_exists<'e, E>(
    executor: E,
    table: IndexTable,
    irs_efile_id: &str,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("DELETE FROM {} WHERE irs_efile_id = ?", table.name());
    let result = sqlx::query(&sql).bind(irs_efile_id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}
