//! Resolution of caller-supplied dates and week numbers into a `WeekKey`.
//!
//! Weeks follow the `strftime("%U")` convention: weeks start on Sunday and any
//! days before the first Sunday of the year belong to week 0.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Pulldate value meaning "whatever week it is now".
pub const CURRENT_WEEK_SENTINEL: &str = "00000000";

/// Highest week number a caller may request directly.
pub const MAX_REQUESTED_WEEK: u32 = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekKey {
    pub week: u32,
    pub year: i32,
}

impl WeekKey {
    pub fn new(week: u32, year: i32) -> Self {
        Self { week, year }
    }

    /// The week containing `date`, keyed by that date's own year.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            week: sunday_week(date),
            year: date.year(),
        }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "week {:02} of {}", self.week, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date requested: {0}")]
pub struct InvalidWeek(pub String);

/// Sunday-indexed week of the year, 0..=53.
pub fn sunday_week(date: NaiveDate) -> u32 {
    let yday = date.ordinal0();
    let wday = date.weekday().num_days_from_sunday();
    (yday + 7 - wday) / 7
}

/// Turns a pulldate or explicit week number into a canonical key.
///
/// A pulldate wins over `week`. Parsed dates never resolve to a week earlier
/// than the one containing `today`. `year` falls back to `today`'s year, even
/// when a pulldate from another year was supplied.
pub fn resolve(
    pulldate: Option<&str>,
    week: Option<&str>,
    year: Option<i32>,
    today: NaiveDate,
) -> Result<WeekKey, InvalidWeek> {
    let current_week = sunday_week(today);

    let week = match pulldate.map(str::trim).filter(|p| !p.is_empty()) {
        Some(pulldate) if is_current_marker(pulldate) => current_week,
        Some(pulldate) => {
            let parsed = parse_pulldate(pulldate)?;
            let requested = sunday_week(parsed);
            if current_week > requested {
                current_week
            } else {
                requested
            }
        }
        None => parse_week_number(week)?,
    };

    Ok(WeekKey {
        week,
        year: year.unwrap_or_else(|| today.year()),
    })
}

fn is_current_marker(pulldate: &str) -> bool {
    pulldate == CURRENT_WEEK_SENTINEL
        || pulldate.eq_ignore_ascii_case("none")
        || pulldate.eq_ignore_ascii_case("null")
}

fn parse_pulldate(pulldate: &str) -> Result<NaiveDate, InvalidWeek> {
    if !pulldate.contains('-') {
        return Err(InvalidWeek(pulldate.to_string()));
    }
    NaiveDate::parse_from_str(pulldate, "%Y-%m-%d").map_err(|_| InvalidWeek(pulldate.to_string()))
}

fn parse_week_number(week: Option<&str>) -> Result<u32, InvalidWeek> {
    let raw = week.map(str::trim).unwrap_or_default();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(InvalidWeek(format!("week '{}'", raw)));
    }
    match raw.parse::<u32>() {
        Ok(n) if n <= MAX_REQUESTED_WEEK => Ok(n),
        _ => Err(InvalidWeek(format!("week '{}'", raw))),
    }
}
