//! data-loader: download a ticker's daily history from Yahoo and keep it in SQLite.
//!
//! Usage:
//!   cargo run -p data-loader -- fetch --ticker AAPL --start 2015-01-01 --end 2025-09-20
//!   cargo run -p data-loader -- inspect --ticker AAPL --limit 5

use analysis_core::{validate_symbol, Interval, PriceSeries};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use price_store::{PriceStore, TablePreview, DEFAULT_DATABASE_PATH};
use yahoo_client::YahooFinanceClient;

#[derive(Parser)]
#[command(name = "data-loader")]
#[command(about = "Daily price history into a local SQLite file.", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily bars and replace the ticker's table.
    Fetch {
        #[arg(long, default_value = "AAPL")]
        ticker: String,
        #[arg(long, default_value = "2015-01-01")]
        start: NaiveDate,
        /// Exclusive; defaults to today
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Defaults to $DATABASE_PATH, then stock_data.db
        #[arg(long)]
        db: Option<String>,
    },
    /// Print the first rows and the exact column names of a ticker's table.
    Inspect {
        #[arg(long, default_value = "AAPL")]
        ticker: String,
        #[arg(long)]
        db: Option<String>,
        #[arg(long, default_value_t = 5)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_loader=info,price_store=info,yahoo_client=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Fetch {
            ticker,
            start,
            end,
            db,
        } => fetch(&ticker, start, end, &database_path(db)).await,
        Commands::Inspect { ticker, db, limit } => inspect(&ticker, &database_path(db), limit).await,
    }
}

fn database_path(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("DATABASE_PATH").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
}

async fn fetch(ticker: &str, start: NaiveDate, end: Option<NaiveDate>, db: &str) -> anyhow::Result<()> {
    let symbol = validate_symbol(ticker)?;
    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    if end <= start {
        anyhow::bail!("--end ({}) must be after --start ({})", end, start);
    }

    let base_url =
        std::env::var("YAHOO_BASE_URL").unwrap_or_else(|_| yahoo_client::DEFAULT_BASE_URL.to_string());
    let client = YahooFinanceClient::with_base_url(&base_url);

    println!("Fetching data for {} from {} to {}...", symbol, start, end);
    let series = client
        .get_historical_data(
            &symbol,
            start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end.and_time(chrono::NaiveTime::MIN).and_utc(),
            Interval::Daily,
        )
        .await
        .with_context(|| format!("Failed to download {}", symbol))?;

    if series.is_empty() {
        anyhow::bail!("No data found for {}. Please check the ticker symbol.", symbol);
    }

    println!("Data fetched successfully. Here are the first 5 rows:");
    println!("{}", format_head(&series, 5));

    println!("\nStoring data in database '{}' in table '{}'...", db, symbol);
    let store = PriceStore::open(db).await?;
    let written = store.replace_series(&series).await?;
    tracing::info!("Replaced table {} with {} rows", symbol, written);

    let stored = store.load_series(&symbol).await?;
    if stored.len() != series.len() {
        anyhow::bail!(
            "Table {} holds {} rows after writing {}",
            symbol,
            stored.len(),
            series.len()
        );
    }
    println!("Data stored successfully: {}.", describe_range(&stored));
    Ok(())
}

async fn inspect(ticker: &str, db: &str, limit: i64) -> anyhow::Result<()> {
    if !PriceStore::exists(db) {
        anyhow::bail!("Database '{}' does not exist; run `data-loader fetch` first", db);
    }

    let symbol = validate_symbol(ticker)?;
    let store = PriceStore::open(db).await?;
    let report = inspect_store(&store, &symbol, limit)
        .await
        .with_context(|| format!("Failed to read table {} from {}", symbol, db))?;
    println!("{}", report);
    Ok(())
}

async fn inspect_store(store: &PriceStore, symbol: &str, limit: i64) -> anyhow::Result<String> {
    let tables = store.tables().await?;
    if !tables.iter().any(|t| t == symbol) {
        let stored = if tables.is_empty() {
            "none".to_string()
        } else {
            tables.join(", ")
        };
        anyhow::bail!("No table named {} (stored tickers: {})", symbol, stored);
    }

    let preview = store.preview(symbol, limit).await?;
    let series = store.load_series(symbol).await?;

    Ok(format!(
        "--- First {} Rows in the Database ---\n{}\n\n{}\n\n--- EXACT COLUMN NAMES ---\n{}\n\n{} holds {}",
        limit,
        format_table(&preview.columns, &preview.rows),
        "=".repeat(30),
        format_columns(&preview),
        symbol,
        describe_range(&series)
    ))
}

/// Row count and date span, e.g. "2700 rows from 2015-01-02 to 2025-09-19"
fn describe_range(series: &PriceSeries) -> String {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) => format!(
            "{} rows from {} to {}",
            series.len(),
            first.timestamp.format("%Y-%m-%d"),
            last.timestamp.format("%Y-%m-%d")
        ),
        _ => "0 rows".to_string(),
    }
}

fn format_head(series: &PriceSeries, n: usize) -> String {
    let columns: Vec<String> = ["Date", "Open", "High", "Low", "Close", "Volume"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows: Vec<Vec<String>> = series
        .bars()
        .iter()
        .take(n)
        .map(|b| {
            vec![
                b.timestamp.format("%Y-%m-%d").to_string(),
                format!("{:.6}", b.open),
                format!("{:.6}", b.high),
                format!("{:.6}", b.low),
                format!("{:.6}", b.close),
                format!("{:.0}", b.volume),
            ]
        })
        .collect();
    format_table(&columns, &rows)
}

/// Right-aligned plain-text table
fn format_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:>width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    std::iter::once(render(columns))
        .chain(rows.iter().map(|row| render(row)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_columns(preview: &TablePreview) -> String {
    let quoted: Vec<String> = preview.columns.iter().map(|c| format!("'{}'", c)).collect();
    format!("[{}]", quoted.join(", "))
}
