//! Parsing related utilities for casting from a string to other types.
use std::marker::PhantomData;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Logic for parsing a string into some type.
pub trait Parser {
    /// The type we'll be producing.
    type Type;

    /// Parse a string into `Type`, returning None if the parse cannot be done.
    fn parse(&mut self, s: &str) -> Option<Self::Type>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolParser;

impl Parser for BoolParser {
    type Type = bool;
    fn parse(&mut self, s: &str) -> Option<Self::Type> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("t") || s == "1" {
            Some(true)
        } else if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("f") || s == "0" {
            Some(false)
        } else {
            None
        }
    }
}

/// Parser that uses the stdlib `FromStr` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FromStrParser<T: FromStr> {
    _type: PhantomData<T>,
}

impl<T: FromStr> FromStrParser<T> {
    pub const fn new() -> Self {
        FromStrParser { _type: PhantomData }
    }
}

impl<T: FromStr> Parser for FromStrParser<T> {
    type Type = T;
    fn parse(&mut self, s: &str) -> Option<Self::Type> {
        T::from_str(s.trim()).ok()
    }
}

/// Parse a string into microseconds since the Unix epoch.
///
/// Example formats:
///
/// '2017-12-05T21:15:00Z'
/// '2017-12-05 21:15:00'
/// '2017-12-05'
/// '2017.12.05 21.15.00Z'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeParser;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y.%m.%d %H.%M.%SZ",
    "%m/%d/%Y %H:%M:%S",
];

impl Parser for DateTimeParser {
    type Type = i64;
    fn parse(&mut self, s: &str) -> Option<Self::Type> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.timestamp_micros());
        }
        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                return Some(dt.and_utc().timestamp_micros());
            }
        }
        if let Ok(date) = NaiveDate::from_str(s) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_micros());
        }
        None
    }
}

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Parse a duration in the form `[-][d.]hh:mm:ss[.fffffff]` into
/// microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpanParser;

impl Parser for TimeSpanParser {
    type Type = i64;
    fn parse(&mut self, s: &str) -> Option<Self::Type> {
        let s = s.trim();
        let (neg, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let mut parts = s.split(':');
        let first = parts.next()?;
        let minutes = parts.next()?;
        let seconds = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let (days, hours) = match first.split_once('.') {
            Some((days, hours)) => (days.parse::<i64>().ok()?, hours.parse::<i64>().ok()?),
            None => (0, first.parse::<i64>().ok()?),
        };
        let minutes = minutes.parse::<i64>().ok()?;
        if days < 0 || !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
            return None;
        }

        let (whole, frac) = match seconds.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (seconds, ""),
        };
        let whole = whole.parse::<i64>().ok()?;
        if !(0..60).contains(&whole) {
            return None;
        }
        let mut frac_micros = 0;
        for (idx, b) in frac.bytes().enumerate() {
            if !b.is_ascii_digit() {
                return None;
            }
            if idx < 6 {
                frac_micros = frac_micros * 10 + (b - b'0') as i64;
            }
        }
        for _ in frac.len()..6 {
            frac_micros *= 10;
        }

        // Days are unbounded, everything else was range checked above.
        let total = days
            .checked_mul(MICROS_PER_DAY)?
            .checked_add(hours * MICROS_PER_HOUR)?
            .checked_add(minutes * MICROS_PER_MINUTE)?
            .checked_add(whole * MICROS_PER_SECOND)?
            .checked_add(frac_micros)?;

        Some(if neg { -total } else { total })
    }
}
