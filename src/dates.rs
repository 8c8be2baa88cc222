//! CF calendar arithmetic, fuzzy date bounds and time-axis encodings
//!
//! Climate model output uses a handful of idealized calendars alongside the
//! real-world one. This module provides date arithmetic for each of them,
//! the fuzzy date bounds used to express limited-precision user requests
//! ("year 2000" means anything from Jan 1 to Dec 31), and the decoding of
//! CF time axes ("days since 1999-01-01").
//!
//! The gregorian calendars delegate to `chrono`; the fixed-length model
//! calendars (noleap, all_leap, 360_day, julian) are implemented directly.

use crate::errors::{PrepError, Result};
use chrono::{Datelike, NaiveDate};
use std::fmt;

const SECS_PER_DAY: i64 = 86_400;

// Cumulative days before each month, non-leap and leap years
const CUM_DAYS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
const CUM_DAYS_LEAP: [i64; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// A calendar-agnostic timestamp, broken out into civil fields.
///
/// Ordering is chronological as long as both sides belong to the same
/// calendar, which is the only way the pipeline ever compares dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CfDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CfDate {
    pub fn new(year: i32, month: u8, day: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    pub fn with_time(mut self, hour: u8, minute: u8, second: u8) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self
    }

    /// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`.
    /// Fractional seconds and a trailing `Z`/`UTC` marker are tolerated.
    pub fn parse(s: &str) -> Result<Self> {
        let cleaned = s
            .trim()
            .trim_end_matches("UTC")
            .trim_end_matches('Z')
            .trim()
            .replace('T', " ");
        let mut parts = cleaned.split_whitespace();
        let date_part = parts
            .next()
            .ok_or_else(|| PrepError::Generic(format!("invalid date '{}'", s)))?;
        let (year, month, day) = parse_ymd(date_part)
            .ok_or_else(|| PrepError::Generic(format!("invalid date '{}'", s)))?;
        let mut date = CfDate::new(year, month, day);
        if let Some(time_part) = parts.next() {
            let fields: Vec<&str> = time_part.split(':').collect();
            let get = |i: usize| -> u8 {
                fields
                    .get(i)
                    .and_then(|f| f.split('.').next())
                    .and_then(|f| f.parse::<u8>().ok())
                    .unwrap_or(0)
            };
            date = date.with_time(get(0), get(1), get(2));
        }
        Ok(date)
    }

    /// Formats the timestamp the way `ncks -d` expects it.
    pub fn format_ncks(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for CfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

fn parse_ymd(s: &str) -> Option<(i32, u8, u8)> {
    let fields: Vec<&str> = s.split('-').collect();
    if fields.len() != 3 {
        return None;
    }
    let year = fields[0].parse::<i32>().ok()?;
    let month = fields[1].parse::<u8>().ok()?;
    let day = fields[2].parse::<u8>().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some((year, month, day))
}

/// A requested date given to limited precision, expanded to the earliest
/// and latest instants consistent with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyBound {
    pub lower: CfDate,
    pub upper: CfDate,
}

impl FuzzyBound {
    /// Parses `YYYY`, `YYYY-MM`, `YYYY-MM-DD` or a full timestamp.
    ///
    /// Expansion for the `upper` bound uses real-world month lengths; the
    /// day is clamped to the dataset's own calendar when the bound is
    /// later converted for comparison against a time axis.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let fields: Vec<&str> = s.splitn(3, '-').collect();
        match fields.len() {
            1 => {
                let year = fields[0]
                    .parse::<i32>()
                    .map_err(|_| PrepError::Generic(format!("invalid date '{}'", s)))?;
                Ok(Self {
                    lower: CfDate::new(year, 1, 1),
                    upper: CfDate::new(year, 12, 31).with_time(23, 59, 59),
                })
            }
            2 => {
                let year = fields[0]
                    .parse::<i32>()
                    .map_err(|_| PrepError::Generic(format!("invalid date '{}'", s)))?;
                let month = fields[1]
                    .parse::<u8>()
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| PrepError::Generic(format!("invalid date '{}'", s)))?;
                let last = Calendar::Standard.days_in_month(year, month);
                Ok(Self {
                    lower: CfDate::new(year, month, 1),
                    upper: CfDate::new(year, month, last).with_time(23, 59, 59),
                })
            }
            _ => {
                let date = CfDate::parse(s)?;
                if s.contains(' ') || s.contains('T') {
                    // exact timestamp, no fuzziness left
                    Ok(Self {
                        lower: date,
                        upper: date,
                    })
                } else {
                    Ok(Self {
                        lower: date,
                        upper: date.with_time(23, 59, 59),
                    })
                }
            }
        }
    }

    pub fn exact(date: CfDate) -> Self {
        Self {
            lower: date,
            upper: date,
        }
    }
}

/// The requested analysis window for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// Time-independent data; no time axis is expected or trimmed.
    Static,
    /// A window with fuzzy bounds at each endpoint.
    Between { start: FuzzyBound, end: FuzzyBound },
}

impl DateRange {
    pub fn is_static(&self) -> bool {
        matches!(self, DateRange::Static)
    }

    /// Builds a range from two limited-precision date strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = FuzzyBound::parse(start)?;
        let end = FuzzyBound::parse(end)?;
        if end.upper < start.lower {
            return Err(PrepError::Generic(format!(
                "date range end {} precedes start {}",
                end.upper, start.lower
            )));
        }
        Ok(DateRange::Between { start, end })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::Static => write!(f, "static"),
            DateRange::Between { start, end } => {
                write!(f, "{} - {}", start.lower, end.upper)
            }
        }
    }
}

/// CF calendar identifiers understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// "standard" / "gregorian"; treated as proleptic gregorian, which is
    /// exact for all model eras after 1582
    Standard,
    ProlepticGregorian,
    Julian,
    /// "noleap" / "365_day"
    NoLeap,
    /// "all_leap" / "366_day"
    AllLeap,
    /// "360_day": twelve 30-day months
    Day360,
}

impl Calendar {
    /// Maps a CF calendar attribute value to a known calendar. Input is
    /// lowercased and stripped first; unknown identifiers return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" => Some(Calendar::Standard),
            "proleptic_gregorian" => Some(Calendar::ProlepticGregorian),
            "julian" => Some(Calendar::Julian),
            "noleap" | "365_day" => Some(Calendar::NoLeap),
            "all_leap" | "366_day" => Some(Calendar::AllLeap),
            "360_day" => Some(Calendar::Day360),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::ProlepticGregorian => "proleptic_gregorian",
            Calendar::Julian => "julian",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        }
    }

    fn is_leap_year(&self, year: i32) -> bool {
        match self {
            Calendar::Standard | Calendar::ProlepticGregorian => {
                year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
            }
            Calendar::Julian => year % 4 == 0,
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    pub fn days_in_month(&self, year: i32, month: u8) -> u8 {
        if *self == Calendar::Day360 {
            return 30;
        }
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => {
                if self.is_leap_year(year) {
                    29
                } else {
                    28
                }
            }
            _ => 30,
        }
    }

    /// Days since an arbitrary fixed origin, monotone in (year, month, day).
    fn days_from_civil(&self, year: i32, month: u8, day: u8) -> i64 {
        let y = year as i64;
        let m = month as i64;
        let d = day as i64;
        match self {
            Calendar::Day360 => y * 360 + (m - 1) * 30 + (d - 1),
            Calendar::NoLeap => y * 365 + CUM_DAYS[month as usize - 1] + (d - 1),
            Calendar::AllLeap => y * 366 + CUM_DAYS_LEAP[month as usize - 1] + (d - 1),
            Calendar::Julian => {
                // Julian day number
                let a = (14 - m) / 12;
                let y2 = y + 4800 - a;
                let m2 = m + 12 * a - 3;
                d + (153 * m2 + 2) / 5 + 365 * y2 + y2 / 4 - 32083
            }
            Calendar::Standard | Calendar::ProlepticGregorian => {
                // chrono is only defined over a finite year range; clamp to
                // its bounds rather than panicking on absurd inputs
                let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
                    .unwrap_or(NaiveDate::MAX);
                date.num_days_from_ce() as i64
            }
        }
    }

    fn civil_from_days(&self, days: i64) -> (i32, u8, u8) {
        match self {
            Calendar::Day360 => {
                let y = days.div_euclid(360);
                let rem = days.rem_euclid(360);
                ((y) as i32, (rem / 30 + 1) as u8, (rem % 30 + 1) as u8)
            }
            Calendar::NoLeap => {
                let y = days.div_euclid(365);
                let rem = days.rem_euclid(365);
                let (m, d) = month_day_from_ordinal(rem, &CUM_DAYS);
                (y as i32, m, d)
            }
            Calendar::AllLeap => {
                let y = days.div_euclid(366);
                let rem = days.rem_euclid(366);
                let (m, d) = month_day_from_ordinal(rem, &CUM_DAYS_LEAP);
                (y as i32, m, d)
            }
            Calendar::Julian => {
                let c = days + 32082;
                let d2 = (4 * c + 3) / 1461;
                let e = c - 1461 * d2 / 4;
                let m2 = (5 * e + 2) / 153;
                let day = e - (153 * m2 + 2) / 5 + 1;
                let month = m2 + 3 - 12 * (m2 / 10);
                let year = d2 - 4800 + m2 / 10;
                (year as i32, month as u8, day as u8)
            }
            Calendar::Standard | Calendar::ProlepticGregorian => {
                let date =
                    NaiveDate::from_num_days_from_ce_opt(days as i32).unwrap_or(NaiveDate::MAX);
                (date.year(), date.month() as u8, date.day() as u8)
            }
        }
    }

    /// Seconds since the calendar's origin for a civil timestamp.
    ///
    /// The day-of-month is clamped to this calendar's month length, so a
    /// request bound like "Feb 29" stays meaningful under noleap.
    pub fn seconds_from_date(&self, date: &CfDate) -> i64 {
        let day = date.day.min(self.days_in_month(date.year, date.month));
        self.days_from_civil(date.year, date.month, day) * SECS_PER_DAY
            + date.hour as i64 * 3600
            + date.minute as i64 * 60
            + date.second as i64
    }

    pub fn date_from_seconds(&self, seconds: i64) -> CfDate {
        let days = seconds.div_euclid(SECS_PER_DAY);
        let rem = seconds.rem_euclid(SECS_PER_DAY);
        let (year, month, day) = self.civil_from_days(days);
        CfDate::new(year, month, day).with_time(
            (rem / 3600) as u8,
            (rem % 3600 / 60) as u8,
            (rem % 60) as u8,
        )
    }
}

fn month_day_from_ordinal(ordinal: i64, cumulative: &[i64; 12]) -> (u8, u8) {
    let month = cumulative.iter().rposition(|&c| c <= ordinal).unwrap_or(0);
    ((month + 1) as u8, (ordinal - cumulative[month] + 1) as u8)
}

/// The decoded `units`/`calendar` encoding of a CF time coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEncoding {
    /// Original `units` attribute value
    pub units: String,
    /// Seconds per stored unit (86400 for "days since ...")
    pub seconds_per_unit: f64,
    /// Reference instant the stored offsets count from
    pub epoch: CfDate,
    /// Calendar attribute as found next to the units, if any
    pub calendar: Option<String>,
}

impl TimeEncoding {
    /// Parses a CF time-units attribute like "days since 1999-01-01".
    /// Returns `None` when the string is not a time encoding at all or the
    /// epoch is malformed.
    pub fn parse(units: &str, calendar: Option<String>) -> Option<Self> {
        let lowered = units.to_lowercase();
        let (unit_word, epoch_str) = lowered.split_once(" since ")?;
        let seconds_per_unit = match unit_word.trim() {
            "seconds" | "second" | "secs" | "sec" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" => 3600.0,
            "days" | "day" => 86400.0,
            _ => return None,
        };
        let epoch = CfDate::parse(epoch_str).ok()?;
        Some(Self {
            units: units.to_string(),
            seconds_per_unit,
            epoch,
            calendar,
        })
    }

    /// Converts a raw axis value to seconds since the calendar origin,
    /// making it directly comparable with `Calendar::seconds_from_date`.
    pub fn to_seconds(&self, value: f64, calendar: Calendar) -> i64 {
        calendar.seconds_from_date(&self.epoch) + (value * self.seconds_per_unit).round() as i64
    }

    /// Decodes a raw axis value to a civil timestamp, for reporting.
    pub fn decode(&self, value: f64, calendar: Calendar) -> CfDate {
        calendar.date_from_seconds(self.to_seconds(value, calendar))
    }
}
