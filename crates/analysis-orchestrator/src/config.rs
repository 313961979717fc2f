use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

pub const DEFAULT_HISTORY_START: &str = "2015-01-01";
pub const DEFAULT_INTRADAY_LOOKBACK_DAYS: i64 = 5;

/// Date ranges the pipeline asks the price source for.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub history_start: NaiveDate,
    /// `None` means "up to today"
    pub history_end: Option<NaiveDate>,
    pub intraday_lookback_days: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            history_start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            history_end: None,
            intraday_lookback_days: DEFAULT_INTRADAY_LOOKBACK_DAYS,
        }
    }
}

impl AnalysisConfig {
    /// Read HISTORY_START, HISTORY_END and INTRADAY_LOOKBACK_DAYS. Unset variables
    /// fall back to defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let history_start = parse_date(
            "HISTORY_START",
            &lookup("HISTORY_START").unwrap_or_else(|| DEFAULT_HISTORY_START.to_string()),
        )?;

        let history_end = match lookup("HISTORY_END").filter(|v| !v.trim().is_empty()) {
            Some(value) => Some(parse_date("HISTORY_END", &value)?),
            None => None,
        };

        let intraday_lookback_days = match lookup("INTRADAY_LOOKBACK_DAYS") {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("INTRADAY_LOOKBACK_DAYS must be an integer, got '{}'", value))?,
            None => DEFAULT_INTRADAY_LOOKBACK_DAYS,
        };
        if intraday_lookback_days < 1 {
            anyhow::bail!("INTRADAY_LOOKBACK_DAYS must be at least 1, got {}", intraday_lookback_days);
        }

        if let Some(end) = history_end {
            if end <= history_start {
                anyhow::bail!("HISTORY_END ({}) must be after HISTORY_START ({})", end, history_start);
            }
        }

        Ok(Self {
            history_start,
            history_end,
            intraday_lookback_days,
        })
    }

    /// `[start, end)` for the daily download, with `end` at midnight of the end date.
    pub fn daily_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.history_end.unwrap_or_else(|| now.date_naive());
        (midnight(self.history_start), midnight(end))
    }

    /// `[now - lookback, now)` for the 1-minute download.
    pub fn intraday_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::days(self.intraday_lookback_days), now)
    }
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("{} must be a YYYY-MM-DD date, got '{}'", key, value))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
