//! Formatting values as strings.
use std::fmt;

use chrono::DateTime;

/// Write microseconds since epoch as `yyyy-MM-dd HH:mm:ss[.ffffff]`.
pub fn format_datetime(micros: i64, f: &mut dyn fmt::Write) -> fmt::Result {
    match DateTime::from_timestamp_micros(micros) {
        Some(dt) => write!(f, "{}", dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f")),
        None => write!(f, "{micros}"),
    }
}

/// Displays microseconds as `[-][d.]hh:mm:ss[.ffffff]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpanDisplay(pub i64);

impl fmt::Display for TimeSpanDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let neg = self.0 < 0;
        let total = self.0.unsigned_abs();

        let micros = total % 1_000_000;
        let secs = total / 1_000_000;
        let (days, secs) = (secs / 86_400, secs % 86_400);
        let (hours, secs) = (secs / 3600, secs % 3600);
        let (minutes, secs) = (secs / 60, secs % 60);

        if neg {
            write!(f, "-")?;
        }
        if days > 0 {
            write!(f, "{days}.")?;
        }
        write!(f, "{hours:02}:{minutes:02}:{secs:02}")?;
        if micros > 0 {
            write!(f, ".{micros:06}")?;
        }
        Ok(())
    }
}

/// Logic for formatting a value into a reusable string buffer.
pub trait Formatter {
    type Type: ?Sized;

    fn write(&mut self, val: &Self::Type, buf: &mut String) -> fmt::Result;
}

/// Formats any `Display` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayFormatter<T: ?Sized>(std::marker::PhantomData<T>);

impl<T: fmt::Display + ?Sized> Formatter for DisplayFormatter<T> {
    type Type = T;

    fn write(&mut self, val: &Self::Type, buf: &mut String) -> fmt::Result {
        use std::fmt::Write;
        write!(buf, "{val}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeFormatter;

impl Formatter for DateTimeFormatter {
    type Type = i64;

    fn write(&mut self, val: &Self::Type, buf: &mut String) -> fmt::Result {
        format_datetime(*val, buf)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSpanFormatter;

impl Formatter for TimeSpanFormatter {
    type Type = i64;

    fn write(&mut self, val: &Self::Type, buf: &mut String) -> fmt::Result {
        use std::fmt::Write;
        write!(buf, "{}", TimeSpanDisplay(*val))
    }
}
