//! Calendar time windows for long-window statistics
//!
//! Window keys: monthly `YYYYMM`, seasonal `YYYY-DJF|MAM|JJA|SON` (keyed by
//! the year the season starts in), annual `YYYY`. Bounds are half-open
//! `[start, end)` and must align to the window grid.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported statistics window kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Monthly,
    Seasonal,
    Annual,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Monthly => "monthly",
            WindowKind::Seasonal => "seasonal",
            WindowKind::Annual => "annual",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(WindowKind::Monthly),
            "seasonal" => Ok(WindowKind::Seasonal),
            "annual" => Ok(WindowKind::Annual),
            other => Err(Error::invalid_argument(format!(
                "unknown window kind: {other:?}"
            ))),
        }
    }
}

/// One statistics window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub kind: WindowKind,
    pub key: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn is_month_start(t: DateTime<Utc>) -> bool {
    t.day() == 1 && t.hour() == 0 && t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("valid month start")
}

fn add_months(t: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total = t.month0() + months;
    let year = t.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    month_start(year, month)
}

fn season_label(start_month: u32) -> &'static str {
    match start_month {
        12 => "DJF",
        3 => "MAM",
        6 => "JJA",
        9 => "SON",
        _ => unreachable!("validated season start month"),
    }
}

/// Enumerate the windows of `kind` covering `[start, end)`.
///
/// `start` and `end` must land exactly on window boundaries; seasonal
/// windows start in December, March, June or September.
pub fn iter_time_windows(
    kind: WindowKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TimeWindow>> {
    if start >= end {
        return Err(Error::invalid_argument(format!(
            "expected start < end, got {start} >= {end}"
        )));
    }

    let step_months = match kind {
        WindowKind::Monthly => 1,
        WindowKind::Seasonal => 3,
        WindowKind::Annual => 12,
    };

    let aligned = |t: DateTime<Utc>| -> bool {
        if !is_month_start(t) {
            return false;
        }
        match kind {
            WindowKind::Monthly => true,
            WindowKind::Seasonal => matches!(t.month(), 12 | 3 | 6 | 9),
            WindowKind::Annual => t.month() == 1,
        }
    };
    if !aligned(start) || !aligned(end) {
        return Err(Error::invalid_argument(format!(
            "{kind} windows require bounds aligned to {kind} boundaries, got [{start}, {end})"
        )));
    }

    let mut windows = Vec::new();
    let mut window_start = start;
    while window_start < end {
        let window_end = add_months(window_start, step_months);
        if window_end > end {
            return Err(Error::invalid_argument(format!(
                "{kind} windows require bounds aligned to {kind} boundaries, got [{start}, {end})"
            )));
        }
        let key = match kind {
            WindowKind::Monthly => {
                format!("{:04}{:02}", window_start.year(), window_start.month())
            }
            WindowKind::Seasonal => format!(
                "{:04}-{}",
                window_start.year(),
                season_label(window_start.month())
            ),
            WindowKind::Annual => format!("{:04}", window_start.year()),
        };
        windows.push(TimeWindow {
            kind,
            key,
            start: window_start,
            end: window_end,
        });
        window_start = window_end;
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_monthly_keys_and_bounds() {
        let windows =
            iter_time_windows(WindowKind::Monthly, utc(2020, 1, 1), utc(2020, 3, 1)).unwrap();
        let keys: Vec<&str> = windows.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["202001", "202002"]);
        assert_eq!(windows[0].start, utc(2020, 1, 1));
        assert_eq!(windows[0].end, utc(2020, 2, 1));
    }

    #[test]
    fn test_seasonal_djf_spans_year_boundary() {
        let windows =
            iter_time_windows(WindowKind::Seasonal, utc(2020, 12, 1), utc(2021, 3, 1)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].key, "2020-DJF");
        assert_eq!(windows[0].start, utc(2020, 12, 1));
        assert_eq!(windows[0].end, utc(2021, 3, 1));
    }

    #[test]
    fn test_seasonal_all_labels() {
        let windows =
            iter_time_windows(WindowKind::Seasonal, utc(2020, 3, 1), utc(2021, 3, 1)).unwrap();
        let keys: Vec<&str> = windows.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["2020-MAM", "2020-JJA", "2020-SON", "2020-DJF"]);
    }

    #[test]
    fn test_annual_keys() {
        let windows =
            iter_time_windows(WindowKind::Annual, utc(2020, 1, 1), utc(2022, 1, 1)).unwrap();
        let keys: Vec<&str> = windows.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, vec!["2020", "2021"]);
    }

    #[test]
    fn test_rejects_misaligned_bounds() {
        let err = iter_time_windows(WindowKind::Monthly, utc(2020, 1, 2), utc(2020, 2, 1))
            .unwrap_err();
        assert!(err.to_string().contains("monthly windows require"));

        let err = iter_time_windows(
            WindowKind::Monthly,
            utc(2020, 1, 1),
            Utc.with_ymd_and_hms(2020, 2, 15, 0, 0, 0).unwrap(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("monthly windows require"));

        let err = iter_time_windows(WindowKind::Seasonal, utc(2020, 1, 1), utc(2020, 4, 1))
            .unwrap_err();
        assert!(err.to_string().contains("seasonal windows require"));

        let err = iter_time_windows(WindowKind::Annual, utc(2020, 2, 1), utc(2021, 2, 1))
            .unwrap_err();
        assert!(err.to_string().contains("annual windows require"));
    }

    #[test]
    fn test_rejects_reversed_bounds() {
        assert!(
            iter_time_windows(WindowKind::Monthly, utc(2020, 2, 1), utc(2020, 1, 1)).is_err()
        );
    }

    #[test]
    fn test_window_kind_parse() {
        assert_eq!("monthly".parse::<WindowKind>().unwrap(), WindowKind::Monthly);
        assert_eq!("Seasonal".parse::<WindowKind>().unwrap(), WindowKind::Seasonal);
        assert!("weekly".parse::<WindowKind>().is_err());
    }
}
