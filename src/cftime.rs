//! Decoding of CF-convention time coordinates (`<unit> since <reference>`).
//!
//! Model output routinely uses non-standard calendars, so only the real
//! calendars go through chrono; `noleap`, `all_leap` and `360_day` use fixed
//! month lengths.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Timelike};
use thiserror::Error;

const SECONDS_PER_DAY: i64 = 86_400;

const NOLEAP_MONTHS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const ALL_LEAP_MONTHS: [i64; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const DAY360_MONTHS: [i64; 12] = [30; 12];

#[derive(Error, Debug, PartialEq)]
pub enum TimeError {
    #[error("unsupported calendar '{0}'")]
    UnsupportedCalendar(String),
    #[error("invalid time units '{0}'")]
    InvalidUnits(String),
    #[error("invalid reference date '{0}'")]
    InvalidReference(String),
    #[error("time value {0} cannot be represented")]
    OutOfRange(f64),
}

/// CF calendars.
///
/// `Standard` is decoded as proleptic Gregorian, so dates before 1582-10-15
/// differ from the mixed Julian/Gregorian calendar CF defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Standard,
    ProlepticGregorian,
    NoLeap,
    AllLeap,
    Day360,
}

impl FromStr for Calendar {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "gregorian" => Ok(Calendar::Standard),
            "proleptic_gregorian" => Ok(Calendar::ProlepticGregorian),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(TimeError::UnsupportedCalendar(other.to_string())),
        }
    }
}

impl Calendar {
    fn fixed_months(self) -> Option<&'static [i64; 12]> {
        match self {
            Calendar::NoLeap => Some(&NOLEAP_MONTHS),
            Calendar::AllLeap => Some(&ALL_LEAP_MONTHS),
            Calendar::Day360 => Some(&DAY360_MONTHS),
            Calendar::Standard | Calendar::ProlepticGregorian => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn seconds(self) -> f64 {
        match self {
            TimeUnit::Days => 86_400.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Seconds => 1.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            "hours" | "hour" | "hr" | "h" => Ok(TimeUnit::Hours),
            "minutes" | "minute" | "min" => Ok(TimeUnit::Minutes),
            "seconds" | "second" | "sec" | "s" => Ok(TimeUnit::Seconds),
            other => Err(TimeError::InvalidUnits(other.to_string())),
        }
    }
}

/// A calendar-agnostic broken-down timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CalendarDateTime {
    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }

    /// Months elapsed since year 0, used to test month contiguity.
    pub fn month_index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    /// `%Y%m%d`
    pub fn format_ymd(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl fmt::Display for CalendarDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeEncoding {
    unit: TimeUnit,
    reference: CalendarDateTime,
    calendar: Calendar,
}

impl TimeEncoding {
    /// Parses `units` such as `days since 1850-01-01 00:00:00`. A missing
    /// calendar attribute means `standard`.
    pub fn parse(units: &str, calendar: Option<&str>) -> Result<Self, TimeError> {
        let calendar = match calendar {
            Some(c) if !c.trim().is_empty() => c.parse()?,
            _ => Calendar::Standard,
        };

        // ASCII lowercasing keeps byte offsets, so the split point is valid in `units`.
        let split = units
            .to_ascii_lowercase()
            .find(" since ")
            .ok_or_else(|| TimeError::InvalidUnits(units.to_string()))?;

        Ok(Self {
            unit: units[..split].parse()?,
            reference: parse_reference(units[split + " since ".len()..].trim())?,
            calendar,
        })
    }

    pub fn decode(&self, value: f64) -> Result<CalendarDateTime, TimeError> {
        if !value.is_finite() {
            return Err(TimeError::OutOfRange(value));
        }
        let offset = (value * self.unit.seconds()).round();
        if offset.abs() > i64::MAX as f64 / 2.0 {
            return Err(TimeError::OutOfRange(value));
        }
        let offset = offset as i64;

        match self.calendar.fixed_months() {
            Some(months) => {
                decode_fixed(&self.reference, offset, months).ok_or(TimeError::OutOfRange(value))
            }
            None => decode_gregorian(&self.reference, offset).ok_or(TimeError::OutOfRange(value)),
        }
    }
}

fn parse_reference(s: &str) -> Result<CalendarDateTime, TimeError> {
    let invalid = || TimeError::InvalidReference(s.to_string());

    let mut parts = s.split(['T', ' ']).filter(|p| !p.is_empty());
    let date = parts.next().ok_or_else(invalid)?;

    // A leading '-' belongs to the year, not to the separator.
    let (sign, date) = match date.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, date),
    };
    let mut ymd = date.split('-');
    let year: i32 = ymd.next().and_then(|v| v.parse().ok()).ok_or_else(invalid)?;
    let month: u32 = ymd.next().map_or(Some(1), |v| v.parse().ok()).ok_or_else(invalid)?;
    let day: u32 = ymd.next().map_or(Some(1), |v| v.parse().ok()).ok_or_else(invalid)?;

    let mut out = CalendarDateTime::ymd(sign * year, month, day);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid());
    }

    if let Some(time) = parts.next() {
        let time = time.trim_end_matches(['Z', 'z']);
        let mut hms = time.split(':');
        out.hour = hms.next().and_then(|v| v.parse().ok()).ok_or_else(invalid)?;
        out.minute = hms.next().map_or(Some(0), |v| v.parse().ok()).ok_or_else(invalid)?;
        out.second = hms
            .next()
            .map_or(Some(0.0), |v| v.parse::<f64>().ok())
            .ok_or_else(invalid)? as u32;
    }

    Ok(out)
}

fn decode_gregorian(reference: &CalendarDateTime, offset_seconds: i64) -> Option<CalendarDateTime> {
    let start = NaiveDate::from_ymd_opt(reference.year, reference.month, reference.day)?
        .and_hms_opt(reference.hour, reference.minute, reference.second)?;
    let t = start.checked_add_signed(Duration::try_seconds(offset_seconds)?)?;

    Some(CalendarDateTime {
        year: t.year(),
        month: t.month(),
        day: t.day(),
        hour: t.hour(),
        minute: t.minute(),
        second: t.second(),
    })
}

fn decode_fixed(
    reference: &CalendarDateTime,
    offset_seconds: i64,
    months: &[i64; 12],
) -> Option<CalendarDateTime> {
    let year_len: i64 = months.iter().sum();
    let day_of_year: i64 = months[..(reference.month as usize - 1)].iter().sum::<i64>()
        + reference.day as i64
        - 1;

    let reference_seconds = (reference.year as i64 * year_len + day_of_year) * SECONDS_PER_DAY
        + reference.hour as i64 * 3600
        + reference.minute as i64 * 60
        + reference.second as i64;

    let total = reference_seconds + offset_seconds;
    let days = total.div_euclid(SECONDS_PER_DAY);
    let secs = total.rem_euclid(SECONDS_PER_DAY);

    let year = days.div_euclid(year_len);
    let mut remaining = days.rem_euclid(year_len);
    let mut month = 0;
    while remaining >= months[month] {
        remaining -= months[month];
        month += 1;
    }

    Some(CalendarDateTime {
        year: i32::try_from(year).ok()?,
        month: month as u32 + 1,
        day: remaining as u32 + 1,
        hour: (secs / 3600) as u32,
        minute: (secs % 3600 / 60) as u32,
        second: (secs % 60) as u32,
    })
}
