//! Error type shared by every crate in the workspace.
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad classification of an error.
///
/// Hosts use this to tell "fix your query" apart from "fix your data or
/// environment".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed query, unknown column, bad argument count, or a type that
    /// can't be compared or converted. Raised while building a pipeline.
    Usage,
    /// A single value failed to convert under a strict cast.
    Conversion,
    /// Missing or corrupt files, schema mismatches.
    Io,
    /// Everything else.
    Internal,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usage => "Usage",
            Self::Conversion => "Conversion",
            Self::Io => "IO",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    msg: String,
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<(String, String)>,
    backtrace: Backtrace,
}

impl DbError {
    /// Create a new internal error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, msg)
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Usage, msg)
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Conversion, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Io, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                msg: msg.into(),
                kind,
                source: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Attach a source error.
    ///
    /// An `Internal` error takes the kind of a `DbError` source, so wrapping
    /// with context doesn't hide a usage or io error.
    pub fn with_source(mut self, source: Box<dyn Error + Send + Sync>) -> Self {
        if self.inner.kind == ErrorKind::Internal {
            if let Some(err) = source.downcast_ref::<DbError>() {
                self.inner.kind = err.kind();
            }
        }
        self.inner.source = Some(source);
        self
    }

    /// Attach a key/value field that's printed alongside the message.
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn is_usage(&self) -> bool {
        self.inner.kind == ErrorKind::Usage
    }

    pub fn get_msg(&self) -> &str {
        self.inner.msg.as_str()
    }

    /// Get the value of a field, if set.
    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::new("Format error").with_source(Box::new(value))
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        DbError::io("IO error").with_source(Box::new(value))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(value: serde_json::Error) -> Self {
        DbError::io("Failed to decode json").with_source(Box::new(value))
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        for (key, value) in &self.inner.fields {
            write!(f, "\n  {key}: {value}")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace: {}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// An extension trait for adding context to the Error variant of a result.
pub trait ResultExt<T, E> {
    /// Wrap an error with a static context string.
    fn context(self, msg: &'static str) -> Result<T>;

    /// Wrap an error with a context string generated from a function.
    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::new(msg).with_source(Box::new(e))),
        }
    }

    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::new(f()).with_source(Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(DbError::new(msg)),
        }
    }
}

/// Return a "not implemented" error from the enclosing function.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        return Err($crate::DbError::new(format!("Not yet implemented: {msg}")));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_displayed() {
        let err = DbError::usage("Unknown column")
            .with_field("column", "Name")
            .with_field("available", "ID, Title");

        let s = err.to_string();
        assert!(s.starts_with("Unknown column"));
        assert!(s.contains("column: Name"));
        assert!(s.contains("available: ID, Title"));
        assert_eq!(Some("Name"), err.get_field("column"));
        assert!(err.is_usage());
    }

    #[test]
    fn context_keeps_source_kind() {
        let res: Result<()> = Err(DbError::io("missing file"));
        let err = res.context("Failed to open table").unwrap_err();

        assert_eq!(ErrorKind::Io, err.kind());
        assert_eq!("Failed to open table", err.get_msg());
    }

    #[test]
    fn explicit_kind_kept_over_source() {
        let err = DbError::usage("Cannot compare")
            .with_source(Box::new(DbError::conversion("Cannot parse 'abc'")));
        assert_eq!(ErrorKind::Usage, err.kind());
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: DbError = io.into();
        assert_eq!(ErrorKind::Io, err.kind());
    }
}
