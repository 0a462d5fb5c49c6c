use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xform_error::{DbError, Result};

/// Supported logical column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Microseconds since the Unix epoch, UTC.
    DateTime,
    /// Duration in microseconds.
    TimeSpan,
    /// UTF-8 string values.
    Utf8,
}

/// How values for a logical type are physically laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Utf8,
}

impl DataType {
    pub const ALL: &[DataType] = &[
        DataType::Boolean,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Float32,
        DataType::Float64,
        DataType::DateTime,
        DataType::TimeSpan,
        DataType::Utf8,
    ];

    pub const fn physical_type(&self) -> PhysicalType {
        match self {
            Self::Boolean => PhysicalType::Boolean,
            Self::Int8 => PhysicalType::Int8,
            Self::Int16 => PhysicalType::Int16,
            Self::Int32 => PhysicalType::Int32,
            Self::Int64 | Self::DateTime | Self::TimeSpan => PhysicalType::Int64,
            Self::UInt8 => PhysicalType::UInt8,
            Self::UInt16 => PhysicalType::UInt16,
            Self::UInt32 => PhysicalType::UInt32,
            Self::UInt64 => PhysicalType::UInt64,
            Self::Float32 => PhysicalType::Float32,
            Self::Float64 => PhysicalType::Float64,
            Self::Utf8 => PhysicalType::Utf8,
        }
    }

    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::DateTime => "DateTime",
            Self::TimeSpan => "TimeSpan",
            Self::Utf8 => "String8",
        }
    }

    /// File extension used for the binary value file of this type.
    pub const fn binary_extension(&self) -> &'static str {
        match self.physical_type() {
            PhysicalType::Boolean => "b8",
            PhysicalType::Int8 => "i8",
            PhysicalType::Int16 => "i16",
            PhysicalType::Int32 => "i32",
            PhysicalType::Int64 => "i64",
            PhysicalType::UInt8 => "u8",
            PhysicalType::UInt16 => "u16",
            PhysicalType::UInt32 => "u32",
            PhysicalType::UInt64 => "u64",
            PhysicalType::Float32 => "f32",
            PhysicalType::Float64 => "f64",
            PhysicalType::Utf8 => "s",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Self::Boolean,
            "sbyte" | "int8" => Self::Int8,
            "short" | "int16" => Self::Int16,
            "int" | "int32" => Self::Int32,
            "long" | "int64" => Self::Int64,
            "byte" | "uint8" => Self::UInt8,
            "ushort" | "uint16" => Self::UInt16,
            "uint" | "uint32" => Self::UInt32,
            "ulong" | "uint64" => Self::UInt64,
            "float" | "single" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            "datetime" | "date" => Self::DateTime,
            "timespan" => Self::TimeSpan,
            "string" | "string8" | "utf8" => Self::Utf8,
            _ => {
                return Err(DbError::usage(format!("Unknown type '{s}'")).with_field(
                    "available",
                    DataType::ALL
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_aliases() {
        assert_eq!(DataType::Int32, "int".parse().unwrap());
        assert_eq!(DataType::Int32, "Int32".parse().unwrap());
        assert_eq!(DataType::Utf8, "String8".parse().unwrap());
        assert_eq!(DataType::DateTime, "DATETIME".parse().unwrap());
    }

    #[test]
    fn parse_unknown_is_usage_error() {
        let err = "decimal".parse::<DataType>().unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn display_parses_back() {
        for datatype in DataType::ALL {
            let parsed: DataType = datatype.to_string().parse().unwrap();
            assert_eq!(*datatype, parsed);
        }
    }
}
