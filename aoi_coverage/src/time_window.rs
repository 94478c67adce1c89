//! Month-range time windows and UTC display helpers.

use crate::{AoiCoverageError, AoiCoverageResult};
use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A calendar month, parsed from `YYYY-MM` (or `YYYYMM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> AoiCoverageResult<Self> {
        if !(1..=9999).contains(&year) {
            return Err(AoiCoverageError::InvalidInput(format!(
                "year out of range: {year}"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(AoiCoverageError::InvalidInput(format!(
                "month out of range: {month}"
            )));
        }
        Ok(YearMonth { year, month })
    }

    /// First instant of this month (UTC).
    pub fn first_instant(&self) -> AoiCoverageResult<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| AoiCoverageError::InvalidInput(format!("invalid month {self}")))
    }

    pub fn next(&self) -> YearMonth {
        if self.month == 12 {
            YearMonth {
                year: self.year.saturating_add(1),
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl FromStr for YearMonth {
    type Err = AoiCoverageError;

    fn from_str(s: &str) -> AoiCoverageResult<Self> {
        let s = s.trim();
        let (y, m) = match s.split_once('-') {
            Some((y, m)) => (y, m),
            None if s.len() == 6 && s.is_ascii() => s.split_at(4),
            None => {
                return Err(AoiCoverageError::InvalidInput(format!(
                    "expected YYYY-MM, got '{s}'"
                )))
            }
        };

        let year = y
            .parse::<i32>()
            .map_err(|e| AoiCoverageError::InvalidInput(format!("invalid year in '{s}': {e}")))?;
        let month = m
            .parse::<u32>()
            .map_err(|e| AoiCoverageError::InvalidInput(format!("invalid month in '{s}': {e}")))?;
        YearMonth::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AoiCoverageResult<Self> {
        if start > end {
            return Err(AoiCoverageError::InvalidInput(format!(
                "time window start {start} is after end {end}"
            )));
        }
        Ok(TimeWindow { start, end })
    }

    /// From the first instant of `start` to the first instant of the month
    /// following `end`.
    pub fn from_months(start: YearMonth, end: YearMonth) -> AoiCoverageResult<Self> {
        if start > end {
            return Err(AoiCoverageError::InvalidInput(format!(
                "start month {start} is after end month {end}"
            )));
        }
        TimeWindow::new(start.first_instant()?, end.next().first_instant()?)
    }

    /// Parses a `YYYY-MM` month pair.
    pub fn from_month_strs(start: &str, end: &str) -> AoiCoverageResult<Self> {
        TimeWindow::from_months(start.parse()?, end.parse()?)
    }

    /// STAC `datetime` interval. STAC intervals are closed, so the exclusive
    /// end is rendered as the last whole second before it.
    pub fn to_stac_datetime(&self) -> String {
        let last = if self.end > self.start {
            self.end - Duration::seconds(1)
        } else {
            self.end
        };
        format!(
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            last.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// STAC datetime for an optional window; open (`".."`) when absent.
pub fn stac_datetime(window: Option<&TimeWindow>) -> String {
    window
        .map(TimeWindow::to_stac_datetime)
        .unwrap_or_else(|| "..".to_string())
}

/// How timestamps are rendered in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    Date,
    #[default]
    Datetime,
}

impl FromStr for TimeMode {
    type Err = AoiCoverageError;

    fn from_str(s: &str) -> AoiCoverageResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(TimeMode::Date),
            "datetime" => Ok(TimeMode::Datetime),
            other => Err(AoiCoverageError::InvalidInput(format!(
                "time mode must be 'date' or 'datetime', got '{other}'"
            ))),
        }
    }
}

fn parse_iso(iso: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(iso) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(iso, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// UTC calendar date (`YYYY-MM-DD`) of an ISO timestamp, or `"Unknown"`.
pub fn utc_date_key(iso: &str) -> String {
    match parse_iso(iso) {
        Some(t) => format!("{:04}-{:02}-{:02}", t.year(), t.month(), t.day()),
        None => "Unknown".to_string(),
    }
}

/// Renders an ISO timestamp for display.
///
/// Unparsable input is echoed unchanged in datetime mode.
pub fn format_timestamp(iso: Option<&str>, mode: TimeMode) -> String {
    let Some(iso) = iso.filter(|s| !s.is_empty()) else {
        return "Unknown".to_string();
    };
    match (mode, parse_iso(iso)) {
        (TimeMode::Date, _) => utc_date_key(iso),
        (TimeMode::Datetime, Some(t)) => format!("{} UTC", t.format("%Y-%m-%d %H:%M")),
        (TimeMode::Datetime, None) => iso.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_month() {
        assert_eq!(
            "2024-03".parse::<YearMonth>().unwrap(),
            YearMonth {
                year: 2024,
                month: 3
            }
        );
        assert_eq!(
            "202412".parse::<YearMonth>().unwrap(),
            YearMonth {
                year: 2024,
                month: 12
            }
        );
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("March".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_is_bounded() {
        assert!("0000-01".parse::<YearMonth>().is_err());
        assert!("10000-01".parse::<YearMonth>().is_err());
        assert!(TimeWindow::from_month_strs("2024-01", "2147483647-12").is_err());
        let w = TimeWindow::from_month_strs("9999-11", "9999-12").unwrap();
        assert_eq!(w.end, Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_from_months() {
        let w = TimeWindow::from_month_strs("2024-01", "2024-03").unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
        assert!(w.contains(Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap()));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn test_window_crosses_year() {
        let w = TimeWindow::from_month_strs("2023-11", "2023-12").unwrap();
        assert_eq!(w.end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_rejects_inverted_months() {
        assert!(TimeWindow::from_month_strs("2024-05", "2024-03").is_err());
    }

    #[test]
    fn test_stac_datetime() {
        let w = TimeWindow::from_month_strs("2024-01", "2024-03").unwrap();
        assert_eq!(w.to_stac_datetime(), "2024-01-01T00:00:00Z/2024-03-31T23:59:59Z");
        assert_eq!(stac_datetime(None), "..");
    }

    #[test]
    fn test_date_helpers() {
        assert_eq!(utc_date_key("2024-02-03T23:30:00-02:00"), "2024-02-04");
        assert_eq!(utc_date_key("garbage"), "Unknown");
        assert_eq!(
            format_timestamp(Some("2024-02-03T10:11:12.5Z"), TimeMode::Datetime),
            "2024-02-03 10:11 UTC"
        );
        assert_eq!(
            format_timestamp(Some("2024-02-03T10:11:12Z"), TimeMode::Date),
            "2024-02-03"
        );
        assert_eq!(format_timestamp(Some("n/a"), TimeMode::Datetime), "n/a");
        assert_eq!(format_timestamp(None, TimeMode::Datetime), "Unknown");
    }

    #[test]
    fn test_parse_time_mode() {
        assert_eq!("date".parse::<TimeMode>().unwrap(), TimeMode::Date);
        assert_eq!("DateTime".parse::<TimeMode>().unwrap(), TimeMode::Datetime);
        assert!("week".parse::<TimeMode>().is_err());
    }
}
