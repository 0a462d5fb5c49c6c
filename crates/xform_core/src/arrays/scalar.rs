use std::fmt;

use xform_error::{DbError, Result};

use super::array::Array;
use super::datatype::DataType;
use super::selector::LogicalIndex;
use crate::convert::{CastFailBehavior, TypeConverter};
use crate::convert::format::format_datetime;

/// A single typed value, used for literals and row-at-a-time access.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    DateTime(i64),
    TimeSpan(i64),
    Utf8(String),
}

impl ScalarValue {
    /// Get the datatype for this value, None if it's an untyped null.
    pub fn datatype(&self) -> Option<DataType> {
        Some(match self {
            Self::Null => return None,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::DateTime(_) => DataType::DateTime,
            Self::TimeSpan(_) => DataType::TimeSpan,
            Self::Utf8(_) => DataType::Utf8,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The default ("zero") value for a type.
    pub fn default_for(datatype: DataType) -> Self {
        match datatype {
            DataType::Boolean => Self::Boolean(false),
            DataType::Int8 => Self::Int8(0),
            DataType::Int16 => Self::Int16(0),
            DataType::Int32 => Self::Int32(0),
            DataType::Int64 => Self::Int64(0),
            DataType::UInt8 => Self::UInt8(0),
            DataType::UInt16 => Self::UInt16(0),
            DataType::UInt32 => Self::UInt32(0),
            DataType::UInt64 => Self::UInt64(0),
            DataType::Float32 => Self::Float32(0.0),
            DataType::Float64 => Self::Float64(0.0),
            DataType::DateTime => Self::DateTime(0),
            DataType::TimeSpan => Self::TimeSpan(0),
            DataType::Utf8 => Self::Utf8(String::new()),
        }
    }

    /// Convert this value to another type, erroring if it can't be
    /// represented.
    ///
    /// Conversion goes through the same converters that casts use so that a
    /// literal compares the same way a cast column would.
    pub fn try_cast_to(&self, datatype: DataType) -> Result<ScalarValue> {
        let src = match self.datatype() {
            Some(src) => src,
            None => return Ok(ScalarValue::Null),
        };
        if src == datatype {
            return Ok(self.clone());
        }

        let converter = TypeConverter::try_new(src, datatype, CastFailBehavior::OrThrow, None)?;
        let arr = Array::constant(self, 1)?;
        let mut converted = converter.new_state();
        let out = converter.convert(&arr, &mut converted).map_err(|e| {
            DbError::usage(format!("Cannot convert '{self}' to {datatype}")).with_source(Box::new(e))
        })?;

        Ok(out.scalar(LogicalIndex(0)))
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Ok(matches!(other.try_cast_to(DataType::Boolean)?, Self::Boolean(true))),
        }
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        match self.try_cast_to(DataType::UInt64)? {
            Self::UInt64(v) => usize::try_from(v)
                .map_err(|_| DbError::usage(format!("Value {v} does not fit in usize"))),
            _ => Err(DbError::usage(format!("Expected a number, got '{self}'"))),
        }
    }

    pub fn try_into_string(self) -> Result<String> {
        match self {
            Self::Utf8(s) => Ok(s),
            Self::Null => Err(DbError::usage("Expected a string, got null")),
            other => Ok(other.to_string()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt8(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::DateTime(v) => format_datetime(*v, f),
            Self::TimeSpan(v) => write!(f, "{}", crate::convert::format::TimeSpanDisplay(*v)),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_native {
    ($native:ty, $variant:ident) => {
        impl From<$native> for ScalarValue {
            fn from(value: $native) -> Self {
                ScalarValue::$variant(value)
            }
        }
    };
}

impl_from_native!(bool, Boolean);
impl_from_native!(i8, Int8);
impl_from_native!(i16, Int16);
impl_from_native!(i32, Int32);
impl_from_native!(i64, Int64);
impl_from_native!(u8, UInt8);
impl_from_native!(u16, UInt16);
impl_from_native!(u32, UInt32);
impl_from_native!(u64, UInt64);
impl_from_native!(f32, Float32);
impl_from_native!(f64, Float64);
impl_from_native!(String, Utf8);

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_string_literal_to_int() {
        let v = ScalarValue::from("42").try_cast_to(DataType::Int32).unwrap();
        assert_eq!(ScalarValue::Int32(42), v);
    }

    #[test]
    fn cast_unparseable_literal_is_usage_error() {
        let err = ScalarValue::from("abc")
            .try_cast_to(DataType::Int32)
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn cast_between_ints() {
        let v = ScalarValue::Int64(7).try_cast_to(DataType::UInt8).unwrap();
        assert_eq!(ScalarValue::UInt8(7), v);
    }

    #[test]
    fn null_stays_null() {
        assert_eq!(
            ScalarValue::Null,
            ScalarValue::Null.try_cast_to(DataType::Int32).unwrap()
        );
    }
}
