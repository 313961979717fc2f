//! Single-file SQLite store for daily price history.
//!
//! Each ticker gets its own table. Writes replace the table wholesale
//! (drop, recreate, insert) so a rerun always reflects the latest download.

use analysis_core::{AnalysisError, Bar, Interval, PriceSeries};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, ValueRef};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_DATABASE_PATH: &str = "stock_data.db";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn db_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

/// Column names plus stringified rows, for eyeballing a table
#[derive(Debug, Clone, PartialEq)]
pub struct TablePreview {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone)]
pub struct PriceStore {
    pool: SqlitePool,
}

impl PriceStore {
    /// Open (creating if missing) a database file or `sqlite:` URL.
    pub async fn open(database: &str) -> Result<Self, AnalysisError> {
        let url = if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            format!("sqlite:{}", database)
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(db_err)?
            .create_if_missing(true);

        // One connection keeps `sqlite::memory:` databases coherent
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// Check if database file exists
    pub fn exists(path: &str) -> bool {
        let file_path = path.strip_prefix("sqlite:").unwrap_or(path);
        Path::new(file_path).exists()
    }

    /// Drop and recreate the ticker's table, then write every bar. Returns rows written.
    pub async fn replace_series(&self, series: &PriceSeries) -> Result<u64, AnalysisError> {
        let table = quote_identifier(&series.symbol)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(&format!(
            "CREATE TABLE {} (\"Date\" TEXT NOT NULL, \"Open\" REAL, \"High\" REAL, \"Low\" REAL, \"Close\" REAL, \"Volume\" INTEGER)",
            table
        ))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let insert = format!(
            "INSERT INTO {} (\"Date\", \"Open\", \"High\", \"Low\", \"Close\", \"Volume\") VALUES (?, ?, ?, ?, ?, ?)",
            table
        );
        let mut written = 0u64;
        for bar in series.bars() {
            let result = sqlx::query(&insert)
                .bind(bar.timestamp.format(DATE_FORMAT).to_string())
                .bind(bar.open)
                .bind(bar.high)
                .bind(bar.low)
                .bind(bar.close)
                .bind(bar.volume.round() as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(db_err)?;
        tracing::info!("Stored {} rows in table {}", written, table);
        Ok(written)
    }

    /// Read a ticker's daily series back, ordered by date.
    pub async fn load_series(&self, symbol: &str) -> Result<PriceSeries, AnalysisError> {
        let table = quote_identifier(symbol)?;
        let rows = sqlx::query(&format!(
            "SELECT \"Date\", \"Open\", \"High\", \"Low\", \"Close\", \"Volume\" FROM {} ORDER BY \"Date\"",
            table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let date: String = row.try_get("Date").map_err(db_err)?;
            let timestamp = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| AnalysisError::InvalidData(format!("bad Date '{}': {}", date, e)))?
                .and_utc();
            bars.push(Bar {
                timestamp,
                open: row.try_get("Open").map_err(db_err)?,
                high: row.try_get("High").map_err(db_err)?,
                low: row.try_get("Low").map_err(db_err)?,
                close: row.try_get("Close").map_err(db_err)?,
                volume: row.try_get::<i64, _>("Volume").map_err(db_err)? as f64,
            });
        }

        PriceSeries::new(symbol, Interval::Daily, bars)
    }

    /// Names of all user tables, i.e. the stored tickers.
    pub async fn tables(&self) -> Result<Vec<String>, AnalysisError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(db_err))
            .collect()
    }

    /// Column names and the first `limit` rows of a ticker's table.
    pub async fn preview(&self, symbol: &str, limit: i64) -> Result<TablePreview, AnalysisError> {
        let table = quote_identifier(symbol)?;

        let info = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        if info.is_empty() {
            return Err(AnalysisError::DatabaseError(format!("no table named {}", table)));
        }
        let columns = info
            .iter()
            .map(|row| row.try_get::<String, _>("name").map_err(db_err))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT ?", table))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|i| render_cell(row, i)).collect())
            .collect();

        Ok(TablePreview {
            table: symbol.to_string(),
            columns,
            rows,
        })
    }
}

fn render_cell(row: &sqlx::sqlite::SqliteRow, index: usize) -> String {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return "NULL".to_string(),
        Err(_) => return "?".to_string(),
        _ => {}
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return v.to_string();
    }
    row.try_get::<String, _>(index).unwrap_or_else(|_| "?".to_string())
}

/// Quote a ticker for use as an SQLite table name.
pub fn quote_identifier(name: &str) -> Result<String, AnalysisError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AnalysisError::InvalidData("table name must not be empty".to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}
