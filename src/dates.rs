//! Reporting-period handling: `YYYY-MM` / explicit-date parsing, business-day
//! counting, month abbreviations, and event-timestamp parsing.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc, Weekday};
use tracing::warn;

/// Inclusive reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Count of Mon-Fri dates in the window.
    pub fn business_days(&self) -> u32 {
        let mut count = 0;
        let mut current = self.start;
        while current <= self.end {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                count += 1;
            }
            current = current.succ_opt().expect("date overflow");
        }
        count
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parse a `YYYY-MM` token into (year, month), rejecting malformed tokens and
/// out-of-range month numbers before any file I/O happens.
pub fn parse_month(month: &str) -> Result<(i32, u32)> {
    let parts: Vec<&str> = month.split('-').collect();
    if parts.len() != 2 {
        bail!("Invalid month format '{month}'. Expected YYYY-MM format (e.g., '2025-11')");
    }
    let year: i32 = parts[0]
        .parse()
        .with_context(|| format!("Invalid year in month '{month}'"))?;
    let month_num: u32 = parts[1]
        .parse()
        .with_context(|| format!("Invalid month number in '{month}'"))?;
    if !(1..=12).contains(&month_num) {
        bail!("Invalid month number: {month_num}. Must be between 1 and 12.");
    }
    Ok((year, month_num))
}

/// `YYYY-MM` -> (`"YYYY"`, `"Mmm"`), the key pair used by the trend file.
pub fn month_to_year_and_abbrev(month: &str) -> Result<(String, String)> {
    let (year, month_num) = parse_month(month)?;
    let first = NaiveDate::from_ymd_opt(year, month_num, 1)
        .with_context(|| format!("Invalid month '{month}'"))?;
    Ok((year.to_string(), first.format("%b").to_string()))
}

/// Full calendar-month window for a `YYYY-MM` token.
pub fn month_period(month: &str) -> Result<Period> {
    let (year, month_num) = parse_month(month)?;
    let start = NaiveDate::from_ymd_opt(year, month_num, 1)
        .with_context(|| format!("Invalid month '{month}'"))?;
    let end = if month_num == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_num + 1, 1)
    }
    .and_then(|d| d.pred_opt())
    .with_context(|| format!("Invalid month '{month}'"))?;
    Ok(Period::new(start, end))
}

/// Derive the reporting window from either a month token or an explicit
/// start/end pair. Exactly one form must be supplied.
pub fn derive_period(
    month: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<Period> {
    if let Some(month) = month {
        return month_period(month);
    }
    match (start_date, end_date) {
        (Some(start), Some(end)) => {
            let start = parse_day(start)?;
            let end = parse_day(end)?;
            if start > end {
                bail!("Start date {start} is after end date {end}");
            }
            Ok(Period::new(start, end))
        }
        _ => bail!("Must provide either --month or both --start-date and --end-date"),
    }
}

/// Parse a `YYYY-MM-DD` day string.
pub fn parse_day(day: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{day}'. Use YYYY-MM-DD"))
}

/// Constrain the requested window to a source's available data range.
///
/// Warns when narrowed; fails when the two windows are disjoint since a
/// report over a period with no source coverage would be silently empty.
pub fn constrain_period(requested: Period, available: Option<Period>) -> Result<Period> {
    let Some(available) = available else {
        return Ok(requested);
    };
    let start = requested.start.max(available.start);
    let end = requested.end.min(available.end);
    if start > end {
        bail!(
            "Requested date range {requested} does not overlap with source report range {available}"
        );
    }
    let constrained = Period::new(start, end);
    if constrained != requested {
        warn!(%requested, %constrained, "date range constrained to source report availability");
    }
    Ok(constrained)
}

/// Parse an ISO-8601 event timestamp, handling both a `Z` suffix and explicit
/// offsets, falling back to a naive datetime assumed UTC.
pub fn parse_timestamp(timestamp: &str) -> Result<NaiveDateTime> {
    let normalized = if timestamp.ends_with('Z') {
        timestamp.replace('Z', "+00:00")
    } else {
        timestamp.to_string()
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive);
    }

    bail!("Failed to parse timestamp: {timestamp}")
}
